//! Atomic pid marker I/O.
//!
//! Format: a single line holding the decimal pid.
//! ```text
//! <pid>
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mhos_core::MarkerError;

/// A pid marker read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidMarker {
    pub path: PathBuf,
    pub pid: u32,
}

/// Canonical marker location for a named server: `<dir>/<name>.pid`.
pub fn marker_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.pid"))
}

/// Write a marker atomically using temp file + rename.
///
/// The parent directory is created if needed.
pub fn write_marker(path: &Path, pid: u32) -> Result<PidMarker, MarkerError> {
    let io_err = |source| MarkerError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, format!("{pid}\n")).map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)?;

    Ok(PidMarker {
        path: path.to_path_buf(),
        pid,
    })
}

/// Read a marker. A missing file is `Ok(None)`.
pub fn read_marker(path: &Path) -> Result<Option<PidMarker>, MarkerError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(MarkerError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let pid = parse_marker_content(&content).ok_or_else(|| MarkerError::Malformed {
        path: path.to_path_buf(),
        content: content.clone(),
    })?;

    Ok(Some(PidMarker {
        path: path.to_path_buf(),
        pid,
    }))
}

/// Delete a marker (idempotent - no error if missing).
pub fn remove_marker(path: &Path) -> Result<(), MarkerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MarkerError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// List every `*.pid` file in `dir` with its parse result.
///
/// Malformed markers are reported rather than skipped so cleanup can remove
/// them. A missing directory yields an empty list.
pub fn list_markers(dir: &Path) -> Result<Vec<(PathBuf, Result<u32, MarkerError>)>, MarkerError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(MarkerError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut results = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("pid") {
            continue;
        }
        let parsed = match read_marker(&path) {
            Ok(Some(marker)) => Ok(marker.pid),
            // Raced with a concurrent removal
            Ok(None) => continue,
            Err(e) => Err(e),
        };
        results.push((path, parsed));
    }

    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

fn parse_marker_content(content: &str) -> Option<u32> {
    content
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = marker_path(dir.path(), "whisper");

        let written = write_marker(&path, 98765).expect("write failed");
        assert!(path.exists());
        assert_eq!(written.pid, 98765);

        let read = read_marker(&path).expect("read failed").expect("marker present");
        assert_eq!(read.pid, 98765);

        remove_marker(&path).expect("remove failed");
        assert!(!path.exists());

        // Second remove should be idempotent
        remove_marker(&path).expect("second remove failed");
    }

    #[test]
    fn read_of_never_written_marker_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = marker_path(dir.path(), "kokoro");
        assert!(read_marker(&path).unwrap().is_none());
    }

    #[test]
    fn write_creates_missing_parent_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run").join("kokoro.pid");

        write_marker(&path, 4242).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "4242\n");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn garbage_marker_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = marker_path(dir.path(), "whisper");
        std::fs::write(&path, "not-a-pid\n").unwrap();

        assert!(matches!(
            read_marker(&path),
            Err(MarkerError::Malformed { .. })
        ));
    }

    #[test]
    fn list_filters_non_pid_files_and_reports_malformed() {
        let dir = tempfile::tempdir().unwrap();
        write_marker(&marker_path(dir.path(), "a"), 100).unwrap();
        std::fs::write(dir.path().join("b.pid"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "garbage").unwrap();

        let list = list_markers(dir.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].1.as_ref().ok(), Some(&100));
        assert!(list[1].1.is_err());
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_markers(&dir.path().join("absent")).unwrap().is_empty());
    }
}
