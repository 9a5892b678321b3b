use std::{sync::OnceLock, time::Duration};

use reqwest::redirect::Policy;
use tracing::debug;

/// Browser-like user agent sent to the portal.
pub const DEFAULT_UA: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build a client for authenticated portal calls.
///
/// Redirects are never followed: an expired cookie makes the portal answer with a
/// redirect to the SSO login page, and that status is what marks the session invalid.
pub fn portal_client(timeout: Duration) -> crate::Result<reqwest::Client> {
    install_rustls_provider();
    reqwest::Client::builder()
        .user_agent(DEFAULT_UA)
        .redirect(Policy::none())
        .timeout(timeout)
        .build()
        .map_err(crate::Error::from)
}

/// Build a general-purpose client with a request timeout.
pub fn api_client(timeout: Duration) -> crate::Result<reqwest::Client> {
    install_rustls_provider();
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(crate::Error::from)
}
