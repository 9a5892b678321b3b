//! Re-authentication error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while obtaining a new session credential.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The whole procedure exceeded its time budget.
    #[error("Re-authentication timed out after {0:?}")]
    Timeout(Duration),

    /// An expected page element never appeared.
    #[error("Timed out after {timeout:?} waiting for element `{selector}`")]
    ElementTimeout {
        selector: &'static str,
        timeout: Duration,
    },

    /// Browser could not be launched or driven.
    #[error("Browser error: {0}")]
    Browser(String),

    /// The one-time password could not be generated.
    #[error("One-time password error: {0}")]
    Otp(String),

    /// Login finished but the session cookie was not set.
    #[error("Missing session cookie: {0}")]
    MissingCookie(String),

    /// IO error (spawning helper processes).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RefreshError {
    /// Check if this error came from a step-level or overall timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ElementTimeout { .. })
    }
}

impl From<chromiumoxide::error::CdpError> for RefreshError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Self::Browser(err.to_string())
    }
}
