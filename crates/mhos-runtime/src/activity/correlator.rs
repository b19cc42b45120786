//! Per-session start/end correlation.
//!
//! A record for a key with no open window (or whose window went quiet for
//! longer than the de-dup interval) starts a new cycle and asks the caller to
//! schedule its synthetic end. Records arriving inside the de-dup interval are
//! continuation noise and only refresh the window.
//!
//! Spacing is measured between record timestamps, not between the moments
//! the records were read, so batching by the poll loop does not change the
//! outcome.
//!
//! This is a heuristic. The synthetic end comes from the declared duration or
//! a default, not from an observed call boundary.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mhos_core::{ActivityEvent, ActivityPhase, TelemetrySettings};
use serde_json::Value;

use super::ActivityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatorConfig {
    pub dedup_window: Duration,
    pub default_duration: Duration,
}

impl CorrelatorConfig {
    pub const fn from_settings(settings: &TelemetrySettings) -> Self {
        Self {
            dedup_window: settings.dedup_window(),
            default_duration: settings.default_call_duration(),
        }
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self::from_settings(&TelemetrySettings::with_defaults())
    }
}

/// A synthetic end the caller must deliver back via [`ActivityCorrelator::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEnd {
    pub key: String,
    pub generation: u64,
    pub after: Duration,
}

/// Outcome of one [`ActivityCorrelator::ingest`] call.
#[derive(Debug, Default, PartialEq)]
pub struct Ingested {
    pub events: Vec<ActivityEvent>,
    pub scheduled: Option<ScheduledEnd>,
}

#[derive(Debug)]
struct Window {
    /// Timestamp of the latest record folded into this cycle.
    last_record: DateTime<Utc>,
    generation: u64,
    started_at: DateTime<Utc>,
    duration: Duration,
    metadata: Value,
}

impl Window {
    /// End event at `start + duration`, or at `cutoff` if that is earlier.
    fn end_event(self, key: String, cutoff: Option<DateTime<Utc>>) -> ActivityEvent {
        let elapsed = chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::zero());
        let mut timestamp = self.started_at + elapsed;
        if let Some(cutoff) = cutoff {
            timestamp = timestamp.min(cutoff);
        }
        let mut metadata = self.metadata;
        if let Value::Object(map) = &mut metadata {
            map.insert("synthetic".into(), Value::Bool(true));
        }
        ActivityEvent {
            phase: ActivityPhase::End,
            key,
            timestamp,
            metadata,
        }
    }
}

#[derive(Debug, Default)]
pub struct ActivityCorrelator {
    config: CorrelatorConfig,
    windows: HashMap<String, Window>,
    next_generation: u64,
}

impl ActivityCorrelator {
    pub fn new(config: CorrelatorConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            next_generation: 0,
        }
    }

    pub const fn config(&self) -> CorrelatorConfig {
        self.config
    }

    /// Number of keys with an open cycle.
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    /// Feed one record that was read at `observed_at`.
    ///
    /// `observed_at` only shortens the scheduled end by how late the record
    /// was read; de-dup is decided from record timestamps alone.
    pub fn ingest(&mut self, record: ActivityRecord, observed_at: DateTime<Utc>) -> Ingested {
        let mut out = Ingested::default();

        if let Some(window) = self.windows.get_mut(&record.key) {
            // Out-of-order records count as zero spacing
            let spacing = (record.timestamp - window.last_record)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if spacing <= self.config.dedup_window {
                window.last_record = window.last_record.max(record.timestamp);
                return out;
            }
            // A new cycle while the previous one is still open: close it first
            // so every start is followed by exactly one end.
            if let Some(previous) = self.windows.remove(&record.key) {
                out.events
                    .push(previous.end_event(record.key.clone(), Some(record.timestamp)));
            }
        }

        let duration = record.duration.unwrap_or(self.config.default_duration);
        self.next_generation += 1;
        let generation = self.next_generation;

        let mut metadata = record.metadata;
        if let Value::Object(map) = &mut metadata {
            map.insert(
                "durationMs".into(),
                Value::from(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            );
        }

        out.events.push(ActivityEvent {
            phase: ActivityPhase::Start,
            key: record.key.clone(),
            timestamp: record.timestamp,
            metadata: metadata.clone(),
        });
        self.windows.insert(
            record.key.clone(),
            Window {
                last_record: record.timestamp,
                generation,
                started_at: record.timestamp,
                duration,
                metadata,
            },
        );
        let lag = (observed_at - record.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO);
        out.scheduled = Some(ScheduledEnd {
            key: record.key,
            generation,
            after: duration.saturating_sub(lag),
        });
        out
    }

    /// Fire a scheduled end. Returns `None` when the window was already closed
    /// or belongs to a newer cycle.
    pub fn complete(&mut self, key: &str, generation: u64) -> Option<ActivityEvent> {
        if self.windows.get(key)?.generation != generation {
            return None;
        }
        let window = self.windows.remove(key)?;
        Some(window.end_event(key.to_owned(), None))
    }
}
