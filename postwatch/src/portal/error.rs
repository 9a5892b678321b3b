//! Job portal error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to the job portal.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Network error (connection, timeout, body read).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Unexpected status on an endpoint where it is not an auth signal.
    #[error("Unexpected status {0}")]
    Status(StatusCode),

    /// JSON parse error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Page did not contain the expected content.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl PortalError {
    /// Check if this error is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }
}
