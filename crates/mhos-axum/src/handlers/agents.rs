//! Agent handlers - start/stop named processes under supervision.

use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::Json;
use axum::extract::{Path, State};
use mhos_core::{ProcessHandle, ProcessSpec, StartResult};
use serde::{Deserialize, Serialize};

use crate::error::HttpError;
use crate::state::AppState;

/// Request body for `POST /api/agents/{name}/start`.
#[derive(Debug, Deserialize)]
pub struct StartAgentRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl StartAgentRequest {
    fn into_spec(self, name: String) -> ProcessSpec {
        let mut spec = ProcessSpec::new(name, self.command).args(self.args);
        spec.working_dir = self.cwd;
        spec.env = self.env;
        spec
    }
}

#[derive(Debug, Serialize)]
pub struct StopAgentResponse {
    pub name: String,
    /// `false` when the process had already exited.
    pub signalled: bool,
}

/// List supervised processes.
pub async fn list(State(state): State<AppState>) -> Json<Vec<ProcessHandle>> {
    Json(state.registry.list())
}

pub async fn start(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<StartAgentRequest>,
) -> Result<Json<StartResult>, HttpError> {
    if req.command.trim().is_empty() {
        return Err(HttpError::BadRequest("command must not be empty".to_string()));
    }
    Ok(Json(state.supervisor.start(req.into_spec(name)).await?))
}

pub async fn stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StopAgentResponse>, HttpError> {
    let signalled = state.supervisor.stop(&name).await?;
    Ok(Json(StopAgentResponse { name, signalled }))
}
