//! Notification channels.
//!
//! - Telegram Bot API (interactive: apply button, button presses)
//! - Discord webhooks (post only)

mod discord;
mod telegram;

pub use discord::{DiscordChannel, DiscordConfig};
pub use telegram::{TelegramChannel, TelegramConfig};

/// Truncate a message to fit within a channel character limit.
pub(crate) fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.len();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("hello", 100), "hello");

        let long: String = "é".repeat(5000);
        let truncated = truncate_message(&long, 4096);
        assert!(truncated.chars().count() <= 4096);
        assert!(truncated.ends_with("[truncated]"));
    }
}
