//! Audit records and the audit sink port.
//!
//! Audit records are the append-only trail written by the supervisor and the
//! telemetry feeds. The same line format is what the activity feed tails, so
//! the record type is shared by writers and readers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

/// A single structured audit record.
///
/// Serialized as one JSON object per line. Unknown fields in tailed logs are
/// ignored; `details` and `actor` are optional on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the record was produced.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub level: AuditLevel,
    /// Coarse grouping (e.g. `system`, `action`, `llm`).
    pub category: String,
    /// Event name within the category.
    pub event: String,
    /// Free-form structured payload.
    #[serde(default)]
    pub details: Value,
    /// Who caused the record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl AuditRecord {
    /// Create a record stamped with the current time and empty details.
    pub fn new(level: AuditLevel, category: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            category: category.into(),
            event: event.into(),
            details: Value::Object(serde_json::Map::new()),
            actor: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Look up a string field in `details`.
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    /// Look up a non-negative integer field in `details`.
    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        self.details.get(key).and_then(Value::as_u64)
    }
}

/// Port for appending audit records to an external sink.
///
/// The core only ever appends; it never reads audit state back through this
/// port. Implementations must be cheap to call from async contexts and must
/// not panic on I/O failure.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord);
}

/// Sink that discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn append(&self, _record: AuditRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_details_and_actor() {
        let record = AuditRecord::new(AuditLevel::Info, "system", "process_exited")
            .with_details(json!({ "pid": 42, "name": "organizer" }))
            .with_actor("supervisor");

        assert_eq!(record.detail_u64("pid"), Some(42));
        assert_eq!(record.detail_str("name"), Some("organizer"));
        assert_eq!(record.actor.as_deref(), Some("supervisor"));
    }

    #[test]
    fn parses_minimal_line_without_details() {
        let line = r#"{"timestamp":"2026-03-01T10:00:00Z","level":"warn","category":"llm","event":"call"}"#;
        let record: AuditRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.level, AuditLevel::Warn);
        assert!(record.details.is_null());
        assert!(record.actor.is_none());
    }

    #[test]
    fn serializes_level_lowercase_and_skips_missing_actor() {
        let record = AuditRecord::new(AuditLevel::Error, "system", "spawn_failed");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""level":"error""#));
        assert!(!json.contains("actor"));
    }
}
