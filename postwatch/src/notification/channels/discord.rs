//! Discord webhook notification channel.
//!
//! Webhooks cannot receive button presses, so postings are sent with a link
//! instead of an apply button. Retries on 429 responses respecting the
//! Retry-After header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument, warn};

use super::truncate_message;
use crate::Result;
use crate::apply::ApplyOutcome;
use crate::notification::{ApplyRequest, Notifier, PostingNotice};
use crate::utils::http_client;

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Discord `content` limit.
const DISCORD_CONTENT_LIMIT: usize = 2000;

/// Discord channel configuration.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Discord webhook URL.
    pub webhook_url: String,
    /// Optional username for the webhook.
    pub username: Option<String>,
    pub request_timeout: Duration,
}

impl DiscordConfig {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            username: Some("postwatch".to_string()),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Discord notification channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    /// Create a new Discord channel.
    pub fn new(config: DiscordConfig) -> Result<Self> {
        let client = http_client::api_client(config.request_timeout)?;
        Ok(Self { config, client })
    }

    /// Build the webhook payload for a message.
    fn build_payload(&self, content: &str) -> serde_json::Value {
        let mut payload = json!({
            "content": truncate_message(content, DISCORD_CONTENT_LIMIT),
            "allowed_mentions": { "parse": [] },
        });

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }

        payload
    }

    /// Send request with rate limit handling.
    /// Retries on 429 responses respecting the Retry-After header.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&self.config.webhook_url)
                .json(payload)
                .send()
                .await
                .map_err(|e| crate::Error::Other(format!("Discord request failed: {}", e)))?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(&response);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Discord rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(crate::Error::Other(format!(
                        "Discord rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Discord rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            // Other error - don't retry
            let body = response.text().await.unwrap_or_default();
            warn!("Discord webhook failed: {} - {}", status, body);
            return Err(crate::Error::Other(format!(
                "Discord webhook failed: {} - {}",
                status, body
            )));
        }
    }
}

/// Parse the Retry-After duration from a 429 response.
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| response.headers().get(*name))
        .filter_map(|v| v.to_str().ok()?.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
        .next()
}

#[async_trait]
impl Notifier for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    #[instrument(skip_all, fields(guid = %notice.guid))]
    async fn notify_posting(&self, notice: &PostingNotice) -> Result<()> {
        let payload = self.build_payload(&notice.markdown_within(DISCORD_CONTENT_LIMIT));
        self.send_with_retry(&payload).await?;
        debug!("Discord posting notice sent");
        Ok(())
    }

    async fn notify_status(&self, text: &str) -> Result<()> {
        self.send_with_retry(&self.build_payload(text)).await
    }

    async fn report_apply(&self, request: &ApplyRequest, outcome: &ApplyOutcome) -> Result<()> {
        self.notify_status(&format!("**{}**: {}", request.guid, outcome.label()))
            .await
    }
}
