//! Data directory resolution.
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/logs/run/        pid markers for singleton servers
//! <root>/logs/audit/      one NDJSON audit file per day
//! <root>/etc/templates/   watched configuration documents
//! ```

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::PathError;

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "MHOS_DATA_DIR";

/// Get the root directory for application data.
///
/// Resolution order:
/// 1. `MHOS_DATA_DIR` environment variable
/// 2. System data directory (e.g. `~/.local/share/metahuman`)
pub fn data_root() -> Result<PathBuf, PathError> {
    resolve_data_root(env::var_os(DATA_DIR_ENV))
}

fn resolve_data_root(override_dir: Option<OsString>) -> Result<PathBuf, PathError> {
    match override_dir {
        Some(dir) if dir.is_empty() => Err(PathError::EmptyPath),
        Some(dir) => Ok(PathBuf::from(dir)),
        None => dirs::data_dir()
            .map(|d| d.join("metahuman"))
            .ok_or(PathError::NoDataDir),
    }
}

/// The directory layout under one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout under [`data_root`].
    pub fn resolve() -> Result<Self, PathError> {
        data_root().map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding pid markers.
    pub fn run_dir(&self) -> PathBuf {
        self.root.join("logs").join("run")
    }

    /// Directory holding the daily audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("logs").join("audit")
    }

    /// Directory holding captured worker stdout/stderr.
    pub fn process_logs_dir(&self) -> PathBuf {
        self.root.join("logs").join("processes")
    }

    /// Directory holding watched templates.
    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("etc").join("templates")
    }
}

pub fn run_dir() -> Result<PathBuf, PathError> {
    Ok(DataLayout::resolve()?.run_dir())
}

pub fn audit_dir() -> Result<PathBuf, PathError> {
    Ok(DataLayout::resolve()?.audit_dir())
}

pub fn templates_dir() -> Result<PathBuf, PathError> {
    Ok(DataLayout::resolve()?.templates_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let root = resolve_data_root(Some(OsString::from("/srv/mh"))).unwrap();
        assert_eq!(root, PathBuf::from("/srv/mh"));
    }

    #[test]
    fn empty_override_is_rejected() {
        assert!(matches!(
            resolve_data_root(Some(OsString::new())),
            Err(PathError::EmptyPath)
        ));
    }

    #[test]
    fn subdirectories_hang_off_data_root() {
        let (Ok(root), Ok(run), Ok(audit)) = (data_root(), run_dir(), audit_dir()) else {
            return; // no data dir on this host
        };
        assert!(run.starts_with(&root));
        assert!(audit.ends_with("logs/audit"));
    }

    #[test]
    fn layout_is_rooted_where_asked() {
        let layout = DataLayout::new("/srv/mh");
        assert_eq!(layout.run_dir(), PathBuf::from("/srv/mh/logs/run"));
        assert_eq!(layout.audit_dir(), PathBuf::from("/srv/mh/logs/audit"));
        assert_eq!(layout.templates_dir(), PathBuf::from("/srv/mh/etc/templates"));
        assert_eq!(layout.process_logs_dir(), PathBuf::from("/srv/mh/logs/processes"));
    }
}
