//! Chat notifications and apply-button interactions.
//!
//! [`Notifier`] posts new postings and status notices; [`InteractionSource`]
//! yields apply requests raised by a button press. Telegram implements both,
//! the Discord webhook only posts.

pub mod channels;
mod notice;

pub use channels::{DiscordChannel, DiscordConfig, TelegramChannel, TelegramConfig};
pub use notice::{ApplyRequest, MessageRef, PostingNotice};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::Result;
use crate::apply::ApplyOutcome;

/// A channel that delivers notices to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Post a new posting, with an apply button where the channel supports one.
    async fn notify_posting(&self, notice: &PostingNotice) -> Result<()>;

    /// Post a plain status line (e.g. a refresh failure).
    async fn notify_status(&self, text: &str) -> Result<()>;

    /// Acknowledge an apply request and show its outcome.
    async fn report_apply(&self, request: &ApplyRequest, outcome: &ApplyOutcome) -> Result<()>;
}

/// A source of user-triggered apply requests.
#[async_trait]
pub trait InteractionSource: Send + Sync {
    /// Wait for the next batch of requests. May return an empty batch on timeout.
    async fn next_requests(&self) -> Result<Vec<ApplyRequest>>;
}

/// Fans notices out to every configured channel.
///
/// A channel failure is logged; the call fails only if every channel failed.
pub struct NotificationHub {
    channels: Vec<Arc<dyn Notifier>>,
}

impl NotificationHub {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn settle(&self, op: &str, results: Vec<Result<()>>) -> Result<()> {
        let mut last_error = None;
        let mut delivered = 0;
        for (channel, result) in self.channels.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(channel = channel.channel_type(), error = %e, "Failed to {op}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Notifier for NotificationHub {
    fn channel_type(&self) -> &'static str {
        "hub"
    }

    async fn notify_posting(&self, notice: &PostingNotice) -> Result<()> {
        let results =
            futures::future::join_all(self.channels.iter().map(|c| c.notify_posting(notice)))
                .await;
        self.settle("send posting", results)
    }

    async fn notify_status(&self, text: &str) -> Result<()> {
        let results =
            futures::future::join_all(self.channels.iter().map(|c| c.notify_status(text))).await;
        self.settle("send status", results)
    }

    async fn report_apply(&self, request: &ApplyRequest, outcome: &ApplyOutcome) -> Result<()> {
        let results = futures::future::join_all(
            self.channels
                .iter()
                .map(|c| c.report_apply(request, outcome)),
        )
        .await;
        self.settle("report apply outcome", results)
    }
}
