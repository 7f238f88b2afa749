//! Wire-visible error envelope for the REST API (`spec.md` §6.1).
//!
//! Every response, success or failure, is wrapped in the same
//! `{code, message, data}` envelope; business errors always carry
//! `code: -1` regardless of which HTTP status accompanies them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::error::Error;

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by the API layer: either a core [`Error`] or an
/// API-local concern (missing auth, bad query parameters).
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or invalid API key.
    #[error("Invalid or missing API key.")]
    Unauthorized,

    /// Malformed request body or query parameters.
    #[error("{0}")]
    BadRequest(String),

    /// A core `Error`, mapped onto an HTTP status below.
    #[error(transparent)]
    Core(#[from] Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => match err {
                Error::Validation(_) => StatusCode::BAD_REQUEST,
                Error::Authentication => StatusCode::FORBIDDEN,
                Error::UnknownDriver { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                Error::WorkerUnavailable { .. }
                | Error::CapacityExhausted { .. }
                | Error::HostAlreadyPinned { .. } => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// The `{code, message, data}` envelope every response body is wrapped in.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// `200` on success, `-1` on any business error.
    pub code: i32,
    /// Human-readable summary.
    pub message: String,
    /// Payload; `null` on error.
    pub data: T,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Envelope {
            code: -1,
            message: self.to_string(),
            data: serde_json::Value::Null,
        };
        (status, Json(body)).into_response()
    }
}

/// Wraps a successful payload in the envelope with the given HTTP status
/// (`200` for most endpoints, `201` for job submission).
pub fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    let body = Envelope {
        code: 200,
        message: "ok".to_string(),
        data,
    };
    (status, Json(body)).into_response()
}
