//! Pid markers for singleton servers that outlive the supervisor.
//!
//! Provides atomic I/O, liveness probing, and startup cleanup of stale markers.
//!
//! # Guarantees
//! - Atomic writes via temp file + rename
//! - A missing marker means "not running", never an error
//! - A marker is a claim, not proof: callers check the pid (and ideally a
//!   health endpoint) before trusting it

mod io;
mod sweep;
mod verify;

pub use io::{PidMarker, list_markers, marker_path, read_marker, remove_marker, write_marker};
pub use sweep::{SweepReport, sweep_stale_markers};
pub use verify::{MarkerState, pid_exists, pid_matches_command, inspect, inspect_and_clean};
