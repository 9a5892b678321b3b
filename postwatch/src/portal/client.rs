//! HTTP client for the ETS job portal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use tracing::{debug, instrument, warn};

use super::detail::extract_description;
use super::error::PortalError;
use super::models::PostingList;
use super::{ApplyResponse, FetchOutcome, JobSource};
use crate::session::SessionCredential;
use crate::utils::http_client;

/// Default portal origin.
pub const DEFAULT_BASE_URL: &str = "https://see.etsmtl.ca";

/// Portal client configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Origin of the portal, without trailing slash.
    pub base_url: String,
    /// Secret the apply endpoint asks for.
    pub apply_password: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl PortalConfig {
    pub fn new(apply_password: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            apply_password: apply_password.into(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn search_url(&self) -> String {
        format!("{}/Postes/Rechercher", self.base_url)
    }

    pub fn posting_url(&self, guid: &str) -> String {
        format!("{}/Poste/{}", self.base_url, guid)
    }

    pub fn apply_url(&self) -> String {
        format!("{}/Postulation/Postuler", self.base_url)
    }
}

/// Job portal client.
pub struct PortalClient {
    config: PortalConfig,
    client: Client,
}

impl PortalClient {
    pub fn new(mut config: PortalConfig) -> crate::Result<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let client = http_client::portal_client(config.request_timeout)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }
}

#[async_trait]
impl JobSource for PortalClient {
    fn posting_url(&self, guid: &str) -> String {
        self.config.posting_url(guid)
    }

    #[instrument(skip_all)]
    async fn fetch_postings(
        &self,
        credential: &SessionCredential,
    ) -> Result<FetchOutcome, PortalError> {
        let response = self
            .client
            .get(self.config.search_url())
            .header(header::COOKIE, credential.header_value())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(%status, "Posting search rejected");
            return Ok(FetchOutcome::Rejected(status));
        }

        let body = response.text().await?;
        let list: PostingList = serde_json::from_str(&body)?;
        debug!(count = list.postings.len(), "Fetched postings");
        Ok(FetchOutcome::Postings(list.postings))
    }

    #[instrument(skip(self, credential))]
    async fn fetch_description(
        &self,
        credential: &SessionCredential,
        guid: &str,
    ) -> Result<String, PortalError> {
        let response = self
            .client
            .get(self.config.posting_url(guid))
            .header(header::COOKIE, credential.header_value())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortalError::Status(status));
        }

        let html = response.text().await?;
        extract_description(&html)
    }

    #[instrument(skip(self, credential))]
    async fn apply(
        &self,
        credential: &SessionCredential,
        guid: &str,
    ) -> Result<ApplyResponse, PortalError> {
        let form = [
            ("Postulant.Poste.Guid", guid),
            ("password", self.config.apply_password.as_str()),
        ];

        let response = self
            .client
            .post(self.config.apply_url())
            .header(header::COOKIE, credential.header_value())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        Ok(ApplyResponse::from_status(status))
    }
}
