//! Startup cleanup of pid markers left behind by a previous run.

use std::path::{Path, PathBuf};

use mhos_core::MarkerError;
use tracing::{debug, info, warn};

use super::io::{list_markers, remove_marker};
use super::verify::pid_exists;

/// Result of a stale marker sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Markers removed because their pid is gone or their content is garbage.
    pub removed: Vec<PathBuf>,
    /// Markers kept because their pid is still alive.
    pub alive: Vec<(PathBuf, u32)>,
}

/// Remove stale pid markers from `dir`.
///
/// # Strategy
/// 1. Read every `*.pid` file in the run directory
/// 2. Unparseable or empty markers are removed
/// 3. Markers whose pid no longer exists are removed
/// 4. Live markers are left alone; they belong to servers that survived a
///    restart of the supervisor and are picked up again by status checks
///
/// Nothing is killed here.
pub fn sweep_stale_markers(dir: &Path) -> Result<SweepReport, MarkerError> {
    let markers = list_markers(dir)?;
    let mut report = SweepReport::default();

    if markers.is_empty() {
        debug!(dir = %dir.display(), "No pid markers found");
        return Ok(report);
    }

    for (path, parsed) in markers {
        match parsed {
            Ok(pid) if pid_exists(pid) => {
                debug!(path = %path.display(), pid, "Pid marker is live");
                report.alive.push((path, pid));
            }
            Ok(pid) => {
                debug!(path = %path.display(), pid, "Removing stale pid marker");
                remove_marker(&path)?;
                report.removed.push(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Removing corrupt pid marker");
                remove_marker(&path)?;
                report.removed.push(path);
            }
        }
    }

    if !report.removed.is_empty() {
        info!(
            "Pid marker sweep complete: {} stale removed, {} live kept",
            report.removed.len(),
            report.alive.len()
        );
    }

    Ok(report)
}
