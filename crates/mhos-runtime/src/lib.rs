#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

pub mod activity;
pub mod audit;
pub mod feed;
pub mod pidfile;
pub mod process;
pub mod registry;
pub mod servers;
pub mod stream;
pub mod tail;
pub mod watch;

// Re-export the supervision entry points
pub use process::{
    ProcessEventBroadcaster, ProcessLogSink, ProcessSupervisor, SupervisorConfig, TracingLogSink,
};
pub use registry::ProcessRegistry;

// Re-export singleton server control
pub use servers::{
    ManagedServer, ServerController, ServerDefinition, ServerError, ServerStatus,
    load_server_definitions,
};

// Re-export streaming primitives
pub use activity::{ActivityCorrelator, ActivityRecord, CorrelatorConfig};
pub use feed::{FeedOptions, spawn_activity_feed, spawn_process_feed};
pub use stream::{Frame, SessionState, StreamBroadcaster, StreamSession};
pub use tail::{DailyLogSource, LogCursor, StartAt};
pub use watch::{WatchMode, watch};

// Re-export audit sinks
pub use audit::{FanoutAuditSink, JsonlAuditSink, TracingAuditSink};
