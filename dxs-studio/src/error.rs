//! Error types for dxs-studio
//!
//! Control errors are synchronous rejections of a caller's request and never
//! touch the session. Remote stage failures are not errors here: they are
//! recorded on the session as `SessionError` and drive the phase to FAILED.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::models::Phase;

/// Control surface operation, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ProcessFile,
    StartMidiExtraction,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ProcessFile => f.write_str("process a file"),
            Operation::StartMidiExtraction => f.write_str("start MIDI extraction"),
        }
    }
}

/// Synchronous rejection of a control call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// Control method called from a phase that forbids it
    #[error("cannot {operation} while session is {phase}")]
    InvalidTransition { operation: Operation, phase: Phase },

    /// Malformed parameters
    #[error("invalid parameters: {0}")]
    Validation(String),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Rejected control call (409 or 400)
    #[error(transparent)]
    Control(#[from] ControlError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Control(ref err @ ControlError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string())
            }
            ApiError::Control(ref err @ ControlError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
