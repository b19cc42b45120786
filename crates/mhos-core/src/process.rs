//! Supervised process types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supervision status of a named process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Spawned, readiness not yet confirmed.
    Starting,
    Running,
    /// Exited with code 0.
    Stopped,
    /// Exited with a nonzero code or was killed by a signal.
    Failed,
}

/// A process tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    /// Unique supervisory key (agent name or server name).
    pub name: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub status: ProcessStatus,
}

impl ProcessHandle {
    pub fn new(name: impl Into<String>, pid: u32) -> Self {
        Self {
            name: name.into(),
            pid,
            started_at: Utc::now(),
            status: ProcessStatus::Starting,
        }
    }
}

/// Where a child's stdout/stderr go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "path")]
pub enum OutputMode {
    /// Written to per-process files in the supervisor's capture dir and
    /// forwarded line by line to the process log sink.
    #[default]
    Capture,
    /// Appended to a file and left alone.
    File(PathBuf),
}

/// Everything needed to start a supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment overrides layered over the supervisor's own environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub output: OutputMode,
    /// Pid marker maintained for the lifetime of the child.
    #[serde(default)]
    pub pid_marker: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            output: OutputMode::Capture,
            pid_marker: None,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn pid_marker(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_marker = Some(path.into());
        self
    }
}

/// Outcome of a start request.
///
/// `started == false` means readiness was not confirmed within the timeout.
/// The spawn is not retried or killed in that case; it may still come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResult {
    pub pid: Option<u32>,
    pub started: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builder_collects_args_and_env() {
        let spec = ProcessSpec::new("organizer", "node")
            .args(["brain/agents/organizer.ts", "--once"])
            .env("MH_PROFILE", "default")
            .working_dir("/srv/metahuman");

        assert_eq!(spec.args.len(), 2);
        assert_eq!(spec.env.get("MH_PROFILE").map(String::as_str), Some("default"));
        assert_eq!(spec.output, OutputMode::Capture);
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: ProcessSpec =
            serde_json::from_str(r#"{"name":"whisper","command":"python3"}"#).unwrap();
        assert!(spec.args.is_empty());
        assert!(spec.pid_marker.is_none());
        assert_eq!(spec.output, OutputMode::Capture);
    }

    #[test]
    fn file_output_mode_round_trips_through_tagged_json() {
        let mode: OutputMode =
            serde_json::from_str(r#"{"mode":"file","path":"/tmp/whisper.log"}"#).unwrap();
        assert_eq!(mode, OutputMode::File(PathBuf::from("/tmp/whisper.log")));
    }
}
