//! Telemetry and supervision tuning.
//!
//! The correlation constants here describe a heuristic: a raw call record is
//! stretched into a start/end pair using a de-dup window and a synthetic
//! duration. They approximate call boundaries and are not an exact signal.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default de-dup window between raw records of the same key.
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 100;

/// Default synthetic duration when a record declares none.
pub const DEFAULT_CALL_DURATION_MS: u64 = 2000;

/// Default audit tail poll interval.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default keepalive cadence for streaming sessions.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Default bound on how long `start` waits for spawn confirmation.
pub const DEFAULT_READINESS_TIMEOUT_MS: u64 = 500;

/// Default per-session frame buffer.
pub const DEFAULT_SESSION_BUFFER: usize = 64;

/// Settings validation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} has an unparseable value: {value:?}")]
    Invalid { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetrySettings {
    pub dedup_window_ms: u64,
    pub default_call_duration_ms: u64,
    pub poll_interval_ms: u64,
    pub keepalive_secs: u64,
    pub readiness_timeout_ms: u64,
    pub session_buffer: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TelemetrySettings {
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
            default_call_duration_ms: DEFAULT_CALL_DURATION_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            readiness_timeout_ms: DEFAULT_READINESS_TIMEOUT_MS,
            session_buffer: DEFAULT_SESSION_BUFFER,
        }
    }

    /// Defaults overridden by `MHOS_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::with_defaults();
        override_u64(&lookup, "MHOS_DEDUP_WINDOW_MS", &mut settings.dedup_window_ms)?;
        override_u64(
            &lookup,
            "MHOS_DEFAULT_CALL_MS",
            &mut settings.default_call_duration_ms,
        )?;
        override_u64(&lookup, "MHOS_POLL_INTERVAL_MS", &mut settings.poll_interval_ms)?;
        override_u64(&lookup, "MHOS_KEEPALIVE_SECS", &mut settings.keepalive_secs)?;
        override_u64(
            &lookup,
            "MHOS_READINESS_TIMEOUT_MS",
            &mut settings.readiness_timeout_ms,
        )?;
        if let Some(raw) = lookup("MHOS_SESSION_BUFFER") {
            settings.session_buffer = raw.trim().parse().map_err(|_| SettingsError::Invalid {
                field: "MHOS_SESSION_BUFFER",
                value: raw.clone(),
            })?;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would stall the feeds.
    pub const fn validate(&self) -> Result<(), SettingsError> {
        if self.poll_interval_ms == 0 {
            return Err(SettingsError::Zero {
                field: "poll_interval_ms",
            });
        }
        if self.keepalive_secs == 0 {
            return Err(SettingsError::Zero {
                field: "keepalive_secs",
            });
        }
        if self.session_buffer == 0 {
            return Err(SettingsError::Zero {
                field: "session_buffer",
            });
        }
        Ok(())
    }

    pub const fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub const fn default_call_duration(&self) -> Duration {
        Duration::from_millis(self.default_call_duration_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}

fn override_u64<F>(lookup: &F, field: &'static str, slot: &mut u64) -> Result<(), SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(field) {
        *slot = raw.trim().parse().map_err(|_| SettingsError::Invalid {
            field,
            value: raw.clone(),
        })?;
    }
    Ok(())
}
