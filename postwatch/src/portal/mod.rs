//! Job portal access.
//!
//! [`JobSource`] is the seam the monitor and apply paths depend on;
//! [`PortalClient`] implements it over HTTP.

mod client;
mod detail;
mod error;
mod models;

pub use client::{DEFAULT_BASE_URL, PortalClient, PortalConfig};
pub use detail::extract_description;
pub use error::PortalError;
pub use models::Posting;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::session::SessionCredential;

/// Result of listing postings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The portal accepted the credential.
    Postings(Vec<Posting>),
    /// Any non-200 answer: the credential is no longer accepted.
    Rejected(StatusCode),
}

/// Portal answer to an application submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResponse {
    /// 200: the application was submitted.
    Submitted,
    /// 403: already applied, or the posting requires applying on an external site.
    AlreadyApplied,
    /// Anything else: the credential was rejected.
    Rejected(StatusCode),
}

impl ApplyResponse {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => Self::Submitted,
            StatusCode::FORBIDDEN => Self::AlreadyApplied,
            other => Self::Rejected(other),
        }
    }
}

/// Authenticated access to the job portal.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Public link to a posting, for notices.
    fn posting_url(&self, guid: &str) -> String;

    /// List the currently displayed postings.
    async fn fetch_postings(&self, credential: &SessionCredential)
    -> Result<FetchOutcome, PortalError>;

    /// Fetch the description text of one posting.
    async fn fetch_description(
        &self,
        credential: &SessionCredential,
        guid: &str,
    ) -> Result<String, PortalError>;

    /// Submit an application for a posting.
    async fn apply(
        &self,
        credential: &SessionCredential,
        guid: &str,
    ) -> Result<ApplyResponse, PortalError>;
}
