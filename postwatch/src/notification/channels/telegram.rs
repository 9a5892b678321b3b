//! Telegram Bot API channel.
//!
//! Posts notices with an inline "Postuler" button and long-polls
//! `getUpdates` for button presses. Handles 429 rate limits by respecting the
//! `parameters.retry_after` field returned in the JSON response body.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::Result;
use crate::apply::ApplyOutcome;
use crate::notification::notice::escape_html_within;
use crate::notification::{ApplyRequest, InteractionSource, MessageRef, Notifier, PostingNotice};
use crate::utils::http_client;

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const APPLY_BUTTON_LABEL: &str = "Postuler";
const RETRY_BUTTON_LABEL: &str = "Postuler (retry)";
const DONE_CALLBACK: &str = "done";

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID. Button presses from other chats are ignored.
    pub chat_id: String,
    /// Bot API origin.
    pub api_base: String,
    /// Parse mode for message formatting.
    pub parse_mode: String,
    /// Long-poll duration of `getUpdates`.
    pub poll_timeout: Duration,
    /// Timeout for ordinary API calls.
    pub request_timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: "https://api.telegram.org".to_string(),
            parse_mode: "HTML".to_string(),
            poll_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Telegram notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
    /// Next `getUpdates` offset.
    offset: Mutex<Option<i64>>,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(mut config: TelegramConfig) -> Result<Self> {
        config.api_base = config.api_base.trim_end_matches('/').to_string();
        // Long polls must outlive their own server-side timeout.
        let client = http_client::api_client(config.request_timeout + config.poll_timeout)?;
        Ok(Self {
            config,
            client,
            offset: Mutex::new(None),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base, self.config.bot_token, method
        )
    }

    fn apply_keyboard(label: &str, callback_data: &str) -> Value {
        json!({
            "inline_keyboard": [[{ "text": label, "callback_data": callback_data }]]
        })
    }

    fn build_posting_payload(&self, notice: &PostingNotice) -> Value {
        json!({
            "chat_id": self.config.chat_id,
            "text": notice.html_within(TELEGRAM_MESSAGE_LIMIT),
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": true,
            "reply_markup": Self::apply_keyboard(APPLY_BUTTON_LABEL, &notice.apply_callback_data()),
        })
    }

    /// Call a Bot API method with rate limit handling and return its `result`.
    async fn call(&self, method: &str, payload: &Value) -> Result<Value> {
        let url = self.method_url(method);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| crate::Error::Other(format!("Telegram request failed: {}", e)))?;

            let status = response.status();

            if status.is_success() {
                let body: Value = response.json().await?;
                return Ok(body.get("result").cloned().unwrap_or(Value::Null));
            }

            if status.as_u16() == 429 {
                let body: Value = response.json().await.unwrap_or_default();

                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(crate::Error::Other(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            warn!("Telegram {} failed: {} - {}", method, status, body);
            return Err(crate::Error::Other(format!(
                "Telegram {} failed: {} - {}",
                method, status, body
            )));
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        if let Err(e) = self.call("answerCallbackQuery", &payload).await {
            debug!(error = %e, "Failed to answer callback query");
        }
    }
}

#[async_trait]
impl Notifier for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    #[instrument(skip_all, fields(guid = %notice.guid))]
    async fn notify_posting(&self, notice: &PostingNotice) -> Result<()> {
        let payload = self.build_posting_payload(notice);
        self.call("sendMessage", &payload).await?;
        debug!("Telegram posting notice sent");
        Ok(())
    }

    async fn notify_status(&self, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": escape_html_within(text, TELEGRAM_MESSAGE_LIMIT),
            "parse_mode": self.config.parse_mode,
        });
        self.call("sendMessage", &payload).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(guid = %request.guid))]
    async fn report_apply(&self, request: &ApplyRequest, outcome: &ApplyOutcome) -> Result<()> {
        let Some(message) = request.message else {
            return self
                .notify_status(&format!("{}: {}", request.guid, outcome.label()))
                .await;
        };

        let keyboard = if outcome.is_final() {
            Self::apply_keyboard(outcome.label(), DONE_CALLBACK)
        } else {
            Self::apply_keyboard(RETRY_BUTTON_LABEL, &request.callback_data())
        };

        let payload = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "reply_markup": keyboard,
        });
        self.call("editMessageReplyMarkup", &payload).await?;

        if !outcome.is_final() {
            self.notify_status(&format!("Application failed: {}", outcome.label()))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl InteractionSource for TelegramChannel {
    async fn next_requests(&self) -> Result<Vec<ApplyRequest>> {
        let mut payload = json!({
            "timeout": self.config.poll_timeout.as_secs(),
            "allowed_updates": ["callback_query"],
        });
        if let Some(offset) = *self.offset.lock() {
            payload["offset"] = json!(offset);
        }

        let result = self.call("getUpdates", &payload).await?;
        let updates: Vec<Update> = serde_json::from_value(result)?;
        let batch = collect_requests(updates, self.config.chat_id.parse().ok());

        if let Some(next) = batch.next_offset {
            *self.offset.lock() = Some(next);
        }

        for request in &batch.requests {
            self.answer_callback(&request.interaction_id, Some("Submitting application…"))
                .await;
        }
        for callback_id in &batch.ignored {
            self.answer_callback(callback_id, None).await;
        }

        if !batch.requests.is_empty() {
            debug!(count = batch.requests.len(), "Received apply requests");
        }
        Ok(batch.requests)
    }
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    data: Option<String>,
    message: Option<CallbackMessage>,
}

#[derive(Debug, Deserialize)]
struct CallbackMessage {
    message_id: i64,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Default)]
struct UpdateBatch {
    next_offset: Option<i64>,
    requests: Vec<ApplyRequest>,
    /// Callback queries to acknowledge without acting on them.
    ignored: Vec<String>,
}

/// Turn raw updates into apply requests, dropping presses from other chats.
fn collect_requests(updates: Vec<Update>, allowed_chat: Option<i64>) -> UpdateBatch {
    let mut batch = UpdateBatch::default();

    for update in updates {
        batch.next_offset = Some(
            batch
                .next_offset
                .map_or(update.update_id + 1, |o| o.max(update.update_id + 1)),
        );

        let Some(query) = update.callback_query else {
            continue;
        };

        let message = query.message.map(|m| MessageRef {
            chat_id: m.chat.id,
            message_id: m.message_id,
        });

        let from_allowed_chat = match (allowed_chat, message) {
            (Some(allowed), Some(m)) => m.chat_id == allowed,
            (Some(_), None) => false,
            (None, _) => true,
        };

        let guid = query
            .data
            .as_deref()
            .and_then(ApplyRequest::guid_from_callback)
            .map(str::to_string);

        match guid {
            Some(guid) if from_allowed_chat => batch.requests.push(ApplyRequest {
                guid,
                interaction_id: query.id,
                message,
            }),
            Some(guid) => {
                warn!(%guid, chat = ?message.map(|m| m.chat_id), "Ignoring apply request from another chat");
                batch.ignored.push(query.id);
            }
            None => batch.ignored.push(query.id),
        }
    }

    batch
}
