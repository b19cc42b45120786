use std::time::Duration;

use chrono::{DateTime, Utc};
use mhos_core::AuditRecord;
use serde_json::{Map, Value};

/// A raw "call happened" record, keyed by role.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    /// Declared call duration, when upstream reported one.
    pub duration: Option<Duration>,
    pub metadata: Value,
}

impl ActivityRecord {
    pub fn new(key: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            timestamp,
            duration: None,
            metadata: Value::Object(Map::new()),
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Derive an activity record from an audit line.
    ///
    /// The key is `details.role`, falling back to `details.agent`. Records
    /// with neither are not activity and yield `None`.
    pub fn from_audit(record: &AuditRecord) -> Option<Self> {
        let key = record
            .detail_str("role")
            .or_else(|| record.detail_str("agent"))
            .map(str::trim)
            .filter(|key| !key.is_empty())?;

        let duration = record
            .detail_u64("durationMs")
            .or_else(|| record.detail_u64("latencyMs"))
            .map(Duration::from_millis);

        let mut metadata = Map::new();
        metadata.insert("category".into(), Value::String(record.category.clone()));
        metadata.insert("event".into(), Value::String(record.event.clone()));
        if let Some(model) = record.detail_str("model") {
            metadata.insert("model".into(), Value::String(model.to_owned()));
        }
        if let Some(actor) = &record.actor {
            metadata.insert("actor".into(), Value::String(actor.clone()));
        }

        Some(Self {
            key: key.to_owned(),
            timestamp: record.timestamp,
            duration,
            metadata: Value::Object(metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mhos_core::AuditLevel;
    use serde_json::json;

    #[test]
    fn role_takes_precedence_over_agent() {
        let audit = AuditRecord::new(AuditLevel::Info, "llm", "model_call").with_details(json!({
            "role": "persona",
            "agent": "organizer",
            "latencyMs": 840,
            "model": "qwen3:14b",
        }));

        let activity = ActivityRecord::from_audit(&audit).unwrap();
        assert_eq!(activity.key, "persona");
        assert_eq!(activity.duration, Some(Duration::from_millis(840)));
        assert_eq!(activity.metadata["model"], "qwen3:14b");
        assert_eq!(activity.metadata["event"], "model_call");
    }

    #[test]
    fn agent_is_the_fallback_key() {
        let audit = AuditRecord::new(AuditLevel::Info, "action", "agent_tick")
            .with_details(json!({ "agent": "reflector", "durationMs": 10, "latencyMs": 99 }));

        let activity = ActivityRecord::from_audit(&audit).unwrap();
        assert_eq!(activity.key, "reflector");
        assert_eq!(activity.duration, Some(Duration::from_millis(10)));
    }

    #[test]
    fn records_without_key_are_not_activity() {
        let audit = AuditRecord::new(AuditLevel::Info, "system", "boot");
        assert!(ActivityRecord::from_audit(&audit).is_none());

        let blank = AuditRecord::new(AuditLevel::Info, "llm", "call").with_details(json!({ "role": "  " }));
        assert!(ActivityRecord::from_audit(&blank).is_none());
    }
}
