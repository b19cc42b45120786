//! Singleton server handlers.

use axum::Json;
use axum::extract::{Path, State};
use mhos_core::StartResult;
use mhos_runtime::ServerStatus;
use serde::Serialize;

use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StopServerResponse {
    pub name: String,
    pub stopped: bool,
}

/// Status of every configured server.
pub async fn list(State(state): State<AppState>) -> Json<Vec<ServerStatus>> {
    Json(state.servers.status_all().await)
}

pub async fn status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServerStatus>, HttpError> {
    Ok(Json(state.servers.status(&name).await?))
}

pub async fn start(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StartResult>, HttpError> {
    Ok(Json(state.servers.start(&name).await?))
}

pub async fn stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StopServerResponse>, HttpError> {
    let stopped = state.servers.stop(&name).await?;
    Ok(Json(StopServerResponse { name, stopped }))
}
