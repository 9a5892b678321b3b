//! Re-authentication procedures.
//!
//! The coordinator only needs something that returns a fresh credential or
//! fails within a bounded time; [`BrowserReauthenticator`] is the real one.

mod browser;
mod otp;

pub use browser::{BrowserLoginConfig, BrowserReauthenticator};
pub use otp::YkmanOtp;

use async_trait::async_trait;

use crate::session::{RefreshError, SessionCredential};

/// Obtains a new session credential.
#[async_trait]
pub trait Reauthenticator: Send + Sync {
    /// Run the full login procedure.
    ///
    /// Implementations should bound each of their steps; the caller also
    /// enforces an overall timeout.
    async fn obtain_credential(&self) -> Result<SessionCredential, RefreshError>;
}
