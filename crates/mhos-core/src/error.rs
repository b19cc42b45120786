//! Error taxonomy for supervision, pid markers and path resolution.
//!
//! Stale markers, malformed log lines, truncated sources and closed
//! transports are not errors here. The components that observe them model
//! them as states or counters.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by process supervision calls.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The executable could not be started (missing, not executable, bad cwd).
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A process with this name is already supervised and alive.
    #[error("{name} is already running (pid {pid})")]
    AlreadyRunning { name: String, pid: u32 },

    /// No process with this name is supervised.
    #[error("Process not running: {0}")]
    NotRunning(String),

    /// Sending a signal failed for a reason other than the process being gone.
    #[error("Failed to signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    /// Pid marker I/O failed.
    #[error(transparent)]
    Marker(#[from] MarkerError),

    /// Internal supervisor error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SupervisorError {
    pub fn spawn(command: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }
}

/// Errors from the pid marker store.
///
/// A missing marker file is never an error; readers return `None` instead.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("Pid marker I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Pid marker {path} does not contain a pid: {content:?}")]
    Malformed { path: PathBuf, content: String },
}

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    /// Could not determine the system data directory.
    #[error("Cannot determine system data directory")]
    NoDataDir,

    /// An empty path was provided.
    #[error("Path cannot be empty")]
    EmptyPath,
}
