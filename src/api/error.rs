//! Conversation API error types

use thiserror::Error;

/// API error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InvalidRequest, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ServerError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unknown, message)
    }

    /// Classify a non-success response
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            404 => Self::not_found(format!("Not found: {body}")),
            400 | 422 => Self::invalid_request(format!("Invalid request: {body}")),
            500..=599 => Self::server_error(format!("Server error: {status}")),
            _ => Self::unknown(format!("HTTP {status}: {body}")),
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Could not reach the backend or the connection broke
    Network,
    /// Unknown conversation id (404)
    NotFound,
    /// Rejected request body (400, 422)
    InvalidRequest,
    /// Backend failure (5xx)
    ServerError,
    Unknown,
}
