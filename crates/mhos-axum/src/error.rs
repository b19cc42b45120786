//! Axum-specific error types and mappings.
//!
//! Maps supervision and server-control errors to HTTP status codes and a
//! JSON body `{ "error": ..., "status": ... }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mhos_core::SupervisorError;
use mhos_runtime::ServerError;
use serde::Serialize;
use thiserror::Error;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (invalid input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Conflict (e.g. the process is already running).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request was valid but the process could not be started.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl HttpError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            Self::NotFound(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Unprocessable(msg)
            | Self::Internal(msg) => msg,
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<SupervisorError> for HttpError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Spawn { .. } => Self::Unprocessable(err.to_string()),
            SupervisorError::AlreadyRunning { .. } => Self::Conflict(err.to_string()),
            SupervisorError::NotRunning(_) => Self::NotFound(err.to_string()),
            SupervisorError::Signal { .. }
            | SupervisorError::Marker(_)
            | SupervisorError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ServerError> for HttpError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::UnknownServer(_) => Self::NotFound(err.to_string()),
            ServerError::Supervisor(inner) => inner.into(),
            ServerError::Marker(_) | ServerError::Signal { .. } | ServerError::Config { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}
