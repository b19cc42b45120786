#![doc = include_str!("../README.md")]

pub mod audit;
pub mod error;
pub mod events;
pub mod paths;
pub mod process;
pub mod settings;

// Re-export commonly used types for convenience
pub use audit::{AuditLevel, AuditRecord, AuditSink, NoopAuditSink};
pub use error::{MarkerError, PathError, SupervisorError};
pub use events::{
    ActivityEvent, ActivityPhase, ChangeEvent, ChangeKind, ProcessEvent, ProcessEventKind,
    StreamEvent,
};
pub use paths::{DataLayout, audit_dir, data_root, run_dir, templates_dir};
pub use process::{OutputMode, ProcessHandle, ProcessSpec, ProcessStatus, StartResult};
pub use settings::{SettingsError, TelemetrySettings};
