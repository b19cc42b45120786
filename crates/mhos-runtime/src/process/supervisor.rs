//! Detached worker process supervision.
//!
//! Children are spawned into their own process group without kill-on-drop,
//! and their output goes to files rather than pipes, so they keep running if
//! the supervisor exits or stops tracking them. Each child gets a monitor task
//! that owns the `Child` handle, tails its captured output until it exits,
//! then cleans up the registry and pid marker and appends an audit record.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mhos_core::{
    AuditLevel, AuditRecord, AuditSink, OutputMode, ProcessEvent, ProcessSpec, ProcessStatus,
    StartResult, SupervisorError,
};
use serde_json::json;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tracing::{debug, info, warn};

use super::lifecycle::ProcessEventBroadcaster;
use super::output::{CapturedOutput, ProcessLogSink, TracingLogSink, capture_path};
use super::signal::terminate;
use crate::pidfile::{pid_exists, read_marker, remove_marker, write_marker};
use crate::registry::ProcessRegistry;

/// Actor name stamped on supervisor audit records.
const AUDIT_ACTOR: &str = "supervisor";

/// How often captured output files are read while a child runs.
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How long `start` waits for the spawn to be confirmed.
    pub readiness_timeout: Duration,
    /// Where `OutputMode::Capture` children write their stdout and stderr.
    pub capture_dir: PathBuf,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &mhos_core::TelemetrySettings) -> Self {
        Self {
            readiness_timeout: settings.readiness_timeout(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_capture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture_dir = dir.into();
        self
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_millis(
                mhos_core::settings::DEFAULT_READINESS_TIMEOUT_MS,
            ),
            capture_dir: std::env::temp_dir().join("mhos-output"),
        }
    }
}

/// Spawns and tracks named worker processes.
pub struct ProcessSupervisor {
    registry: Arc<ProcessRegistry>,
    audit: Arc<dyn AuditSink>,
    log_sink: Arc<dyn ProcessLogSink>,
    events: ProcessEventBroadcaster,
    config: SupervisorConfig,
    /// Per-name locks serializing start/stop of the same name
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProcessSupervisor {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        audit: Arc<dyn AuditSink>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            registry,
            audit,
            log_sink: Arc::new(TracingLogSink),
            events: ProcessEventBroadcaster::new(),
            config,
            name_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn ProcessLogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: ProcessEventBroadcaster) -> Self {
        self.events = events;
        self
    }

    pub const fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub const fn events(&self) -> &ProcessEventBroadcaster {
        &self.events
    }

    fn name_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.name_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// Spawn a detached child and wait (bounded) for the spawn to be confirmed.
    ///
    /// Returns `started: false` when confirmation does not arrive within the
    /// readiness timeout; the spawn carries on in the background and registers
    /// itself if it succeeds.
    pub async fn start(&self, spec: ProcessSpec) -> Result<StartResult, SupervisorError> {
        let lock = self.name_lock(&spec.name);
        let _guard = lock.lock().await;

        if let Some(existing) = self.registry.get(&spec.name) {
            if pid_exists(existing.pid) {
                return Err(SupervisorError::AlreadyRunning {
                    name: spec.name,
                    pid: existing.pid,
                });
            }
            debug!(name = %spec.name, pid = %existing.pid, "Dropping registry entry for dead process");
            self.registry.unregister_pid(&spec.name, existing.pid);
        }

        let (command, capture_files) = build_command(&spec, &self.config.capture_dir)
            .map_err(|e| SupervisorError::spawn(spec.command.clone(), e))?;
        let output = CapturedOutput::open(capture_files)
            .await
            .map_err(|e| SupervisorError::spawn(spec.command.clone(), e))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let monitor = ExitMonitor {
            registry: Arc::clone(&self.registry),
            audit: Arc::clone(&self.audit),
            log_sink: Arc::clone(&self.log_sink),
            events: self.events.clone(),
            spec: spec.clone(),
        };
        tokio::spawn(monitor.run(command, output, ready_tx));

        match timeout(self.config.readiness_timeout, ready_rx).await {
            Ok(Ok(Ok(pid))) => Ok(StartResult {
                pid: Some(pid),
                started: true,
            }),
            Ok(Ok(Err(e))) => Err(SupervisorError::spawn(spec.command, e)),
            Ok(Err(_)) => Err(SupervisorError::Internal(format!(
                "spawn task for {} ended without reporting",
                spec.name
            ))),
            Err(_) => {
                warn!(
                    name = %spec.name,
                    timeout_ms = %self.config.readiness_timeout.as_millis(),
                    "Spawn not confirmed within readiness timeout"
                );
                Ok(StartResult {
                    pid: None,
                    started: false,
                })
            }
        }
    }

    /// Send SIGTERM to the tracked process without waiting for it to exit.
    ///
    /// Returns `true` if the signal was delivered, `false` if the process was
    /// already gone (its registry entry is dropped in that case).
    pub async fn stop(&self, name: &str) -> Result<bool, SupervisorError> {
        let lock = self.name_lock(name);
        let _guard = lock.lock().await;

        let handle = self
            .registry
            .get(name)
            .ok_or_else(|| SupervisorError::NotRunning(name.to_string()))?;

        match terminate(handle.pid) {
            Ok(true) => {
                info!(name = %name, pid = %handle.pid, "Stop requested");
                self.audit.append(
                    AuditRecord::new(AuditLevel::Info, "system", "process_stop_requested")
                        .with_details(json!({ "name": name, "pid": handle.pid }))
                        .with_actor(AUDIT_ACTOR),
                );
                self.events
                    .publish(ProcessEvent::stop_requested(name, handle.pid));
                Ok(true)
            }
            Ok(false) => {
                debug!(name = %name, pid = %handle.pid, "Process already gone on stop");
                self.registry.unregister_pid(name, handle.pid);
                self.audit.append(
                    AuditRecord::new(AuditLevel::Warn, "system", "process_already_gone")
                        .with_details(json!({ "name": name, "pid": handle.pid }))
                        .with_actor(AUDIT_ACTOR),
                );
                Ok(false)
            }
            Err(e) => Err(SupervisorError::Signal {
                pid: handle.pid,
                reason: e.to_string(),
            }),
        }
    }
}

/// Build the command and list the capture files the supervisor should tail.
fn build_command(
    spec: &ProcessSpec,
    capture_dir: &Path,
) -> io::Result<(Command, Vec<(&'static str, PathBuf)>)> {
    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .kill_on_drop(false);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let capture_files = match &spec.output {
        OutputMode::Capture => {
            let stdout = capture_path(capture_dir, &spec.name, "stdout");
            let stderr = capture_path(capture_dir, &spec.name, "stderr");
            cmd.stdout(append_to(&stdout)?).stderr(append_to(&stderr)?);
            vec![("stdout", stdout), ("stderr", stderr)]
        }
        OutputMode::File(path) => {
            let file = append_to(path)?;
            let stderr = file.try_clone()?;
            cmd.stdout(file).stderr(stderr);
            Vec::new()
        }
    };

    // Own process group: terminal signals aimed at the supervisor skip the child
    #[cfg(unix)]
    cmd.process_group(0);

    Ok((cmd, capture_files))
}

fn append_to(path: &Path) -> io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Owns a child from spawn to exit.
struct ExitMonitor {
    registry: Arc<ProcessRegistry>,
    audit: Arc<dyn AuditSink>,
    log_sink: Arc<dyn ProcessLogSink>,
    events: ProcessEventBroadcaster,
    spec: ProcessSpec,
}

impl ExitMonitor {
    async fn run(
        self,
        mut command: Command,
        mut output: CapturedOutput,
        ready: oneshot::Sender<io::Result<u32>>,
    ) {
        let name = self.spec.name.clone();
        let started_at = Instant::now();

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(name = %name, command = %self.spec.command, error = %e, "Failed to spawn process");
                self.audit.append(
                    AuditRecord::new(AuditLevel::Error, "system", "process_spawn_failed")
                        .with_details(json!({
                            "name": name,
                            "command": self.spec.command,
                            "error": e.to_string(),
                        }))
                        .with_actor(AUDIT_ACTOR),
                );
                let _ = ready.send(Err(e));
                return;
            }
        };

        let Some(pid) = child.id() else {
            let _ = ready.send(Err(io::Error::other("child exited before its pid was read")));
            return;
        };

        self.registry.register(&name, pid);

        if let Some(marker) = &self.spec.pid_marker {
            if let Err(e) = write_marker(marker, pid) {
                warn!(name = %name, error = %e, "Failed to write pid marker");
            }
        }

        info!(name = %name, pid = %pid, command = %self.spec.command, "Process started");
        self.audit.append(
            AuditRecord::new(AuditLevel::Info, "system", "process_started")
                .with_details(json!({
                    "name": name,
                    "pid": pid,
                    "command": self.spec.command,
                    "args": self.spec.args,
                }))
                .with_actor(AUDIT_ACTOR),
        );
        self.events.publish(ProcessEvent::started(&name, pid));

        if ready.send(Ok(pid)).is_err() {
            debug!(name = %name, pid = %pid, "Spawn confirmed after readiness timeout");
        }
        self.registry.set_status(&name, pid, ProcessStatus::Running);

        let mut ticker = tokio::time::interval(CAPTURE_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let waited = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = ticker.tick(), if !output.is_empty() => {
                    output.drain(&name, &self.log_sink).await;
                }
            }
        };
        output.finish(&name, &self.log_sink).await;

        let exit_code = match waited {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(name = %name, pid = %pid, error = %e, "Failed to wait for process");
                None
            }
        };
        self.finish(pid, exit_code, started_at.elapsed());
    }

    fn finish(&self, pid: u32, exit_code: Option<i32>, elapsed: Duration) {
        let name = &self.spec.name;
        let success = exit_code == Some(0);
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let status = if success {
            ProcessStatus::Stopped
        } else {
            ProcessStatus::Failed
        };
        self.registry.set_status(name, pid, status);
        self.registry.unregister_pid(name, pid);

        if let Some(marker) = &self.spec.pid_marker {
            // Only remove a marker that still names this pid
            match read_marker(marker) {
                Ok(Some(current)) if current.pid == pid => {
                    if let Err(e) = remove_marker(marker) {
                        warn!(name = %name, error = %e, "Failed to remove pid marker");
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(name = %name, error = %e, "Could not read pid marker on exit"),
            }
        }

        if success {
            info!(name = %name, pid = %pid, duration_ms, "Process exited");
        } else {
            warn!(name = %name, pid = %pid, ?exit_code, duration_ms, "Process failed");
        }

        let level = if success {
            AuditLevel::Info
        } else {
            AuditLevel::Error
        };
        self.audit.append(
            AuditRecord::new(level, "system", "process_exited")
                .with_details(json!({
                    "name": name,
                    "pid": pid,
                    "exitCode": exit_code,
                    "durationMs": duration_ms,
                    "success": success,
                }))
                .with_actor(AUDIT_ACTOR),
        );
        self.events
            .publish(ProcessEvent::exited(name, pid, exit_code, duration_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mhos_core::NoopAuditSink;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(
            Arc::new(ProcessRegistry::new()),
            Arc::new(NoopAuditSink),
            SupervisorConfig::default(),
        )
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_error_without_ghost_entry() {
        let supervisor = supervisor();
        let err = supervisor
            .start(ProcessSpec::new("ghost", "/nonexistent/definitely-not-here"))
            .await
            .unwrap_err();

        match err {
            SupervisorError::Spawn { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(supervisor.registry().get("ghost").is_none());
    }

    #[tokio::test]
    async fn stop_unknown_name_is_not_running() {
        let supervisor = supervisor();
        assert!(matches!(
            supervisor.stop("nobody").await,
            Err(SupervisorError::NotRunning(_))
        ));
    }

    #[test]
    fn name_lock_is_shared_per_name() {
        let supervisor = supervisor();
        let a = supervisor.name_lock("organizer");
        let b = supervisor.name_lock("organizer");
        let c = supervisor.name_lock("reflector");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn file_output_mode_creates_log_parent() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("whisper.log");
        let spec = ProcessSpec::new("whisper", "true").output(OutputMode::File(log.clone()));

        let (_, tailed) = build_command(&spec, dir.path()).unwrap();
        assert!(log.exists());
        assert!(tailed.is_empty());
    }

    #[test]
    fn capture_mode_writes_to_files_not_pipes() {
        let dir = tempfile::tempdir().unwrap();
        let capture_dir = dir.path().join("processes");
        let spec = ProcessSpec::new("organizer", "true");

        let (_, tailed) = build_command(&spec, &capture_dir).unwrap();
        let paths: Vec<&Path> = tailed.iter().map(|(_, path)| path.as_path()).collect();
        assert_eq!(
            paths,
            [
                capture_dir.join("organizer.stdout.log"),
                capture_dir.join("organizer.stderr.log")
            ]
        );
        assert!(paths.iter().all(|path| path.exists()));
    }
}
