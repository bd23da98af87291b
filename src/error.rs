//! Unified error handling for the management server.
//!
//! Every handler converts its failure into a `ManagerError`, which renders as
//! `{success: false, error, type}` with a matching status code.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Unified error type for management operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerError {
    /// Binary, config, provider or file missing.
    NotFound(String),
    /// The proxy is already running with the given PID.
    AlreadyRunning(u32),
    /// The proxy is not running.
    NotRunning,
    /// The proxy exited during its startup grace period; carries the log tail.
    ProcessExited(String),
    /// Malformed body, unknown provider, bad parameter.
    InvalidInput(String),
    /// Path exists but not for this method.
    MethodNotAllowed,
    /// The managed proxy or a remote endpoint is unreachable or erroring.
    UpstreamUnavailable(String),
    /// Disk read/write/backup failure.
    Io(String),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "{} not found", what),
            Self::AlreadyRunning(pid) => write!(f, "proxy already running (pid {})", pid),
            Self::NotRunning => write!(f, "not running"),
            Self::ProcessExited(detail) => write!(f, "proxy exited during startup: {}", detail),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::MethodNotAllowed => write!(f, "Method not allowed"),
            Self::UpstreamUnavailable(msg) => write!(f, "Upstream unavailable: {}", msg),
            Self::Io(msg) => write!(f, "IO error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ManagerError {}

impl From<std::io::Error> for ManagerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ManagerError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<JsonRejection> for ManagerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponseBody {
    success: bool,
    error: String,
    r#type: &'static str,
}

impl ManagerError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyRunning(_) | Self::NotRunning => StatusCode::CONFLICT,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ProcessExited(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error type string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyRunning(_) | Self::NotRunning => "conflict",
            Self::InvalidInput(_) => "invalid_input",
            Self::ProcessExited(_) => "process_exited",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Io(_) => "io_failure",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        let body = ErrorResponseBody {
            success: false,
            error: self.to_string(),
            r#type: self.error_type(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
