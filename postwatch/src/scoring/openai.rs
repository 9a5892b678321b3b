//! OpenAI chat-completions scorer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use super::{FitVerdict, ScoreError, Scorer};
use crate::utils::http_client;

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

const FIT_SYSTEM_PROMPT: &str = "You are an automated job application assistant for ETS job postings. \
You will be given internship offers scraped from the ETS job board. Using the JSON resume provided, \
determine whether the student would be a good fit for an entry-level intern position. \
Answer with 1 if yes and 0 if no, followed by a brief explanation (under 400 characters), \
strictly in this JSON format: {\"fit\": 1, \"analysis\": \"The student is a good fit because...\"}. \
Applicant spots are limited, so be strict: if the student is not at least 60% competent for the role, answer 0.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You are an automated assistant that summarizes job postings for easy review.";

/// Scorer configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Candidate resume (JSON). Fit assessment is skipped without it.
    pub profile: Option<String>,
    /// Extra constraints appended to the profile (e.g. reachable cities).
    pub travel_note: Option<String>,
    pub request_timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-5-nano".to_string(),
            profile: None,
            travel_note: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Scores postings through the chat completions API.
pub struct OpenAiScorer {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiScorer {
    pub fn new(mut config: OpenAiConfig) -> crate::Result<Self> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let client = http_client::api_client(config.request_timeout)?;
        Ok(Self { config, client })
    }

    fn fit_messages(&self, profile: &str, description: &str) -> Value {
        let mut profile_message =
            format!("Here is the CV to use for the job applications:\n\n{profile}");
        if let Some(note) = &self.config.travel_note {
            profile_message.push_str("\n\n");
            profile_message.push_str(note);
        }

        json!([
            { "role": "system", "content": FIT_SYSTEM_PROMPT },
            { "role": "user", "content": profile_message },
            {
                "role": "user",
                "content": format!(
                    "Here is a new job posting description:\n\n{description}\n\n\
                     Based on the CV provided earlier, determine if the student would be a good fit for this position."
                ),
            },
        ])
    }

    fn summary_messages(description: &str) -> Value {
        json!([
            { "role": "system", "content": SUMMARY_SYSTEM_PROMPT },
            {
                "role": "user",
                "content": format!(
                    "Summarize the following job posting in 3-4 concise sentences (under 600 characters) \
                     highlighting the key responsibilities and requirements:\n\n{description}"
                ),
            },
        ])
    }

    /// Send a completion request with rate limit handling and return the message content.
    async fn complete(&self, messages: Value, json_mode: bool) -> Result<String, ScoreError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
        });
        if json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let mut attempts = 0;
        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body: CompletionResponse = response.json().await?;
                return body
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| ScoreError::Malformed("no completion content".to_string()));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<f64>().ok())
                    .map(Duration::from_secs_f64);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "OpenAI rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(ScoreError::RateLimited(MAX_RATE_LIMIT_RETRIES));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "OpenAI rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ScoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[async_trait]
impl Scorer for OpenAiScorer {
    #[instrument(skip_all)]
    async fn summarize(&self, description: &str) -> Result<String, ScoreError> {
        let summary = self
            .complete(Self::summary_messages(description), false)
            .await?;
        Ok(summary.trim().to_string())
    }

    #[instrument(skip_all)]
    async fn assess_fit(&self, description: &str) -> Result<Option<FitVerdict>, ScoreError> {
        let Some(profile) = self.config.profile.as_deref() else {
            return Ok(None);
        };

        let content = self
            .complete(self.fit_messages(profile, description), true)
            .await?;
        parse_verdict(&content).map(Some)
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawVerdict {
    fit: Value,
    #[serde(default)]
    analysis: String,
}

/// Parse `{"fit": 0|1, "analysis": "..."}`, tolerating code fences and boolean/string fits.
fn parse_verdict(content: &str) -> Result<FitVerdict, ScoreError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let raw: RawVerdict = serde_json::from_str(body)
        .map_err(|e| ScoreError::Malformed(format!("{e}: {body}")))?;

    let fit = match &raw.fit {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v >= 1.0),
        Value::String(s) => matches!(s.trim(), "1" | "true" | "yes"),
        other => {
            return Err(ScoreError::Malformed(format!("unexpected fit value: {other}")));
        }
    };

    Ok(FitVerdict {
        fit,
        analysis: raw.analysis.trim().to_string(),
    })
}
