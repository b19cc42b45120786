//! Liveness probing for pid markers.

use std::path::Path;

use mhos_core::MarkerError;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

use super::io::{read_marker, remove_marker};

/// What a marker on disk says about its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker file.
    Absent,
    /// Marker present and its pid exists. May still be a reused pid.
    Alive(u32),
    /// Marker present but the pid is gone (or the content is unreadable).
    Stale(Option<u32>),
}

impl MarkerState {
    pub const fn pid(self) -> Option<u32> {
        match self {
            Self::Alive(pid) => Some(pid),
            Self::Stale(pid) => pid,
            Self::Absent => None,
        }
    }

    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Alive(_))
    }
}

/// Check if a PID exists (without verifying it's our process).
///
/// Uses `kill` with the null signal, which checks existence without
/// delivering anything.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid as NixPid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match signal::kill(NixPid::from_raw(raw), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        // Process exists but we lack permission
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub fn pid_exists(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    system.process(Pid::from_u32(pid)).is_some()
}

/// Check that a live pid's command line contains `needle`.
///
/// Guards against signalling an unrelated process that inherited a reused
/// pid. Returns `false` when the process is gone or cannot be inspected.
pub fn pid_matches_command(pid: u32, needle: &str) -> bool {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

    let Some(process) = system.process(target) else {
        return false;
    };

    process
        .cmd()
        .iter()
        .any(|arg| arg.to_string_lossy().contains(needle))
        || process.name().to_string_lossy().contains(needle)
}

/// Read a marker and check whether its pid is alive. Never mutates disk.
pub fn inspect(path: &Path) -> Result<MarkerState, MarkerError> {
    match read_marker(path) {
        Ok(None) => Ok(MarkerState::Absent),
        Ok(Some(marker)) if pid_exists(marker.pid) => Ok(MarkerState::Alive(marker.pid)),
        Ok(Some(marker)) => Ok(MarkerState::Stale(Some(marker.pid))),
        Err(MarkerError::Malformed { .. }) => Ok(MarkerState::Stale(None)),
        Err(e) => Err(e),
    }
}

/// Inspect a marker and remove it when stale.
pub fn inspect_and_clean(path: &Path) -> Result<MarkerState, MarkerError> {
    let state = inspect(path)?;
    if let MarkerState::Stale(pid) = state {
        debug!(path = %path.display(), ?pid, "Removing stale pid marker");
        remove_marker(path)?;
    }
    Ok(state)
}
