//! Process supervision.
//!
//! # Structure
//!
//! - `ProcessSupervisor` - spawns detached children, tracks them in the
//!   registry, maintains pid markers and reports exits to the audit sink
//! - `ProcessEventBroadcaster` - lifecycle events for streaming clients
//! - `ProcessLogSink` - destination for captured stdout/stderr lines
//! - signalling helpers (fire-and-forget terminate, escalating kill)
//! - HTTP health checks for singleton servers

mod health;
mod lifecycle;
mod output;
pub mod signal;
mod supervisor;

pub use health::check_http_health;
pub use lifecycle::ProcessEventBroadcaster;
pub use output::{ProcessLogSink, TracingLogSink};
pub use signal::{kill_pid, terminate};
pub use supervisor::{ProcessSupervisor, SupervisorConfig};
