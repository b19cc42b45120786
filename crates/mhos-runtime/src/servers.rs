//! Singleton back-end servers (voice, transcription).
//!
//! These servers must outlive a restart of the control process, so their
//! state lives in a pid marker under the run directory rather than only in
//! the registry. Status combines the marker with an optional HTTP health
//! check; stop escalates SIGTERM to SIGKILL and removes the marker.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mhos_core::{MarkerError, ProcessSpec, StartResult, SupervisorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::pidfile::{MarkerState, marker_path, pid_matches_command, inspect_and_clean, remove_marker};
use crate::process::{ProcessSupervisor, check_http_health, kill_pid};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Marker(#[from] MarkerError),

    #[error("Failed to stop pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Invalid server definitions in {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

/// One entry of the servers file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDefinition {
    #[serde(flatten)]
    pub spec: ProcessSpec,
    /// `GET` target expected to answer 2xx while the server is healthy.
    #[serde(default)]
    pub health_url: Option<String>,
    /// Fragment the live process's command line must contain before we
    /// signal it.
    #[serde(default)]
    pub command_match: Option<String>,
}

/// Load definitions from a JSON array file.
pub fn load_server_definitions(path: &Path) -> Result<Vec<ServerDefinition>, ServerError> {
    let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ServerError::Config {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedServer {
    pub spec: ProcessSpec,
    pub marker: PathBuf,
    pub health_url: Option<String>,
    pub command_match: Option<String>,
}

impl ManagedServer {
    /// Attach a marker under `run_dir` named after the server.
    pub fn new(definition: ServerDefinition, run_dir: &Path) -> Self {
        let marker = marker_path(run_dir, &definition.spec.name);
        Self {
            spec: definition.spec.pid_marker(&marker),
            marker,
            health_url: definition.health_url,
            command_match: definition.command_match,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub name: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// `None` when no health URL is configured or the server is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
}

pub struct ServerController {
    supervisor: Arc<ProcessSupervisor>,
    servers: BTreeMap<String, ManagedServer>,
}

impl ServerController {
    pub fn new(
        supervisor: Arc<ProcessSupervisor>,
        servers: impl IntoIterator<Item = ManagedServer>,
    ) -> Self {
        Self {
            supervisor,
            servers: servers
                .into_iter()
                .map(|server| (server.name().to_owned(), server))
                .collect(),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&ManagedServer> {
        self.servers.get(name)
    }

    fn server(&self, name: &str) -> Result<&ManagedServer, ServerError> {
        self.get(name)
            .ok_or_else(|| ServerError::UnknownServer(name.to_owned()))
    }

    /// Inspect the marker (removing it if stale) and the health endpoint.
    pub async fn status(&self, name: &str) -> Result<ServerStatus, ServerError> {
        let server = self.server(name)?;
        let state = inspect_and_clean(&server.marker)?;

        let healthy = match (&server.health_url, state) {
            (Some(url), MarkerState::Alive(_)) => Some(check_http_health(url, HEALTH_TIMEOUT).await),
            _ => None,
        };
        Ok(ServerStatus {
            name: server.name().to_owned(),
            running: state.is_alive(),
            pid: if state.is_alive() { state.pid() } else { None },
            healthy,
        })
    }

    pub async fn status_all(&self) -> Vec<ServerStatus> {
        let mut statuses = Vec::with_capacity(self.servers.len());
        for name in self.servers.keys() {
            match self.status(name).await {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(server = %name, error = %e, "Failed to read server status"),
            }
        }
        statuses
    }

    /// Start the server unless a live instance already holds the marker.
    pub async fn start(&self, name: &str) -> Result<StartResult, ServerError> {
        let server = self.server(name)?;

        if let MarkerState::Alive(pid) = inspect_and_clean(&server.marker)? {
            info!(server = %name, pid, "Server already running");
            return Ok(StartResult {
                pid: Some(pid),
                started: true,
            });
        }

        match self.supervisor.start(server.spec.clone()).await {
            Ok(result) => Ok(result),
            Err(SupervisorError::AlreadyRunning { pid, .. }) => Ok(StartResult {
                pid: Some(pid),
                started: true,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop the server recorded in the marker. Returns `false` when nothing
    /// was running.
    pub async fn stop(&self, name: &str) -> Result<bool, ServerError> {
        let server = self.server(name)?;

        let pid = match inspect_and_clean(&server.marker)? {
            MarkerState::Alive(pid) => pid,
            MarkerState::Absent | MarkerState::Stale(_) => return Ok(false),
        };

        if let Some(needle) = &server.command_match
            && !pid_matches_command(pid, needle)
        {
            warn!(server = %name, pid, %needle, "Marker pid belongs to another process, dropping marker");
            remove_marker(&server.marker)?;
            return Ok(false);
        }

        info!(server = %name, pid, "Stopping server");
        kill_pid(pid, STOP_GRACE)
            .await
            .map_err(|source| ServerError::Signal { pid, source })?;
        remove_marker(&server.marker)?;
        Ok(true)
    }
}
