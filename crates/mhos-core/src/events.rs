//! Events pushed to streaming clients.
//!
//! Every variant of [`StreamEvent`] maps to one wire event type. Clients are
//! expected to ignore event types they do not recognize, so new variants can
//! be added without breaking older consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::AuditRecord;

/// Phase of a synthesized activity cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityPhase {
    Start,
    End,
}

impl ActivityPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

/// A synthesized start or end of activity for one correlation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub phase: ActivityPhase,
    /// Correlation key, usually a role label.
    pub key: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// A change to a watched configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Logical name derived from the file name (stem without suffix).
    pub name: String,
    pub change_type: ChangeKind,
}

/// Lifecycle transition of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessEventKind {
    Started,
    StopRequested,
    Exited,
}

/// Process lifecycle event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEvent {
    pub kind: ProcessEventKind,
    pub name: String,
    pub pid: u32,
    /// Exit code, only for `exited`. `None` when killed by a signal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Milliseconds since the process was started, only for `exited`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ProcessEvent {
    pub fn started(name: impl Into<String>, pid: u32) -> Self {
        Self {
            kind: ProcessEventKind::Started,
            name: name.into(),
            pid,
            exit_code: None,
            duration_ms: None,
        }
    }

    pub fn stop_requested(name: impl Into<String>, pid: u32) -> Self {
        Self {
            kind: ProcessEventKind::StopRequested,
            name: name.into(),
            pid,
            exit_code: None,
            duration_ms: None,
        }
    }

    pub fn exited(
        name: impl Into<String>,
        pid: u32,
        exit_code: Option<i32>,
        duration_ms: u64,
    ) -> Self {
        Self {
            kind: ProcessEventKind::Exited,
            name: name.into(),
            pid,
            exit_code,
            duration_ms: Some(duration_ms),
        }
    }
}

/// Any event that can be delivered over a streaming session.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Activity(ActivityEvent),
    Change(ChangeEvent),
    Process(ProcessEvent),
    /// Raw audit record forwarded as-is.
    Audit(AuditRecord),
    /// Informational message (e.g. a watched directory is missing).
    Info { message: String },
}

impl StreamEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    /// Wire event type name.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Activity(activity) => activity.phase.as_str(),
            Self::Change(_) => "change",
            Self::Process(_) => "process",
            Self::Audit(_) => "audit",
            Self::Info { .. } => "info",
        }
    }

    /// JSON payload for the `data:` line.
    pub fn payload(&self) -> serde_json::Result<String> {
        match self {
            Self::Activity(activity) => serde_json::to_string(activity),
            Self::Change(change) => serde_json::to_string(change),
            Self::Process(process) => serde_json::to_string(process),
            Self::Audit(record) => serde_json::to_string(record),
            Self::Info { message } => {
                serde_json::to_string(&serde_json::json!({ "message": message }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_event_type_follows_phase() {
        let event = StreamEvent::Activity(ActivityEvent {
            phase: ActivityPhase::End,
            key: "persona".to_string(),
            timestamp: Utc::now(),
            metadata: Value::Null,
        });
        assert_eq!(event.event_type(), "end");
    }

    #[test]
    fn change_payload_uses_camel_case() {
        let event = StreamEvent::Change(ChangeEvent {
            name: "greeting".to_string(),
            change_type: ChangeKind::Modified,
        });
        assert_eq!(
            event.payload().unwrap(),
            r#"{"name":"greeting","changeType":"modified"}"#
        );
    }

    #[test]
    fn process_started_omits_exit_fields() {
        let payload = StreamEvent::Process(ProcessEvent::started("organizer", 7))
            .payload()
            .unwrap();
        assert_eq!(payload, r#"{"kind":"started","name":"organizer","pid":7}"#);
    }

    #[test]
    fn info_payload_wraps_message() {
        let payload = StreamEvent::info("missing").payload().unwrap();
        assert_eq!(payload, r#"{"message":"missing"}"#);
    }
}
