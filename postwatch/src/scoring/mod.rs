//! Posting review with a language model.
//!
//! Every new posting gets a short summary; when a candidate profile is
//! configured it also gets a fit verdict.

mod openai;

pub use openai::{OpenAiConfig, OpenAiScorer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the scoring backend.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Rate limit exceeded after {0} retries")]
    RateLimited(u32),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Whether the candidate should apply, with a short justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitVerdict {
    pub fit: bool,
    pub analysis: String,
}

/// Reviews posting descriptions.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Summarize a posting for quick review.
    async fn summarize(&self, description: &str) -> Result<String, ScoreError>;

    /// Judge the candidate's fit. `Ok(None)` when no profile is configured.
    async fn assess_fit(&self, description: &str) -> Result<Option<FitVerdict>, ScoreError>;
}
