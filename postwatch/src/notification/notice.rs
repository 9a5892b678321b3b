use serde::{Deserialize, Serialize};

use crate::scoring::FitVerdict;

/// Prefix of the callback payload carried by an apply button.
const APPLY_CALLBACK_PREFIX: &str = "apply:";

/// Description excerpt shown when no summary is available.
const DESCRIPTION_EXCERPT_CHARS: usize = 600;

/// Longest title rendered in a notice.
const TITLE_LIMIT_CHARS: usize = 256;

/// A new posting, ready to be rendered for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingNotice {
    pub guid: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub summary: Option<String>,
    pub verdict: Option<FitVerdict>,
}

impl PostingNotice {
    pub fn new(
        guid: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            guid: guid.into(),
            title: title.into(),
            url: url.into(),
            description: description.into(),
            summary: None,
            verdict: None,
        }
    }

    /// Summary if one was produced, otherwise the head of the description.
    pub fn body(&self) -> String {
        match &self.summary {
            Some(summary) => summary.clone(),
            None => excerpt(&self.description, DESCRIPTION_EXCERPT_CHARS),
        }
    }

    /// Markdown rendering (Discord).
    pub fn markdown(&self) -> String {
        self.markdown_within(usize::MAX)
    }

    /// Markdown rendering of at most `limit` characters.
    ///
    /// Title, body and analysis are shortened; the posting URL is always kept.
    pub fn markdown_within(&self, limit: usize) -> String {
        self.render_within(limit, str::to_string, |title, body, analysis, url| {
            let mut text = format!("# New offer\n## {title}\n\n### Description\n{body}");
            if let Some(analysis) = analysis {
                text.push_str(&format!("\n\n### Analysis\n{analysis}"));
            }
            text.push_str(&format!("\n\n{url}"));
            text
        })
    }

    /// HTML rendering (Telegram `parse_mode=HTML`).
    pub fn html(&self) -> String {
        self.html_within(usize::MAX)
    }

    /// HTML rendering of at most `limit` characters.
    ///
    /// Text is shortened before escaping, so entities are never split and the
    /// closing link survives.
    pub fn html_within(&self, limit: usize) -> String {
        self.render_within(limit, escape_html, |title, body, analysis, url| {
            let mut text = format!(
                "\u{1f514} <b>New offer</b>\n<b>{title}</b>\n\n<b>Description</b>\n{body}"
            );
            if let Some(analysis) = analysis {
                text.push_str(&format!("\n\n<b>Analysis</b>\n{analysis}"));
            }
            text.push_str(&format!("\n\n<a href=\"{url}\">View posting</a>"));
            text
        })
    }

    /// Fit the variable parts into whatever `limit` leaves after the frame.
    /// The analysis gets at most a third of the room, the body the rest.
    fn render_within(
        &self,
        limit: usize,
        escape: fn(&str) -> String,
        render: impl Fn(&str, &str, Option<&str>, &str) -> String,
    ) -> String {
        let url = escape(&self.url);
        let title = fit_text(&self.title, TITLE_LIMIT_CHARS, escape);
        let has_analysis = self.verdict.is_some();

        let frame = render(&title, "", has_analysis.then_some(""), &url)
            .chars()
            .count();
        let mut room = limit.saturating_sub(frame);

        let analysis = self.verdict.as_ref().map(|verdict| {
            let analysis = fit_text(&verdict.analysis, room / 3, escape);
            room = room.saturating_sub(analysis.chars().count());
            analysis
        });
        let body = fit_text(&self.body(), room, escape);

        render(&title, &body, analysis.as_deref(), &url)
    }

    /// Callback payload for this posting's apply button.
    pub fn apply_callback_data(&self) -> String {
        format!("{APPLY_CALLBACK_PREFIX}{}", self.guid)
    }
}

/// Location of a posted message, for editing it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// A user asked to apply to a posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub guid: String,
    /// Channel-specific id used to acknowledge the interaction.
    pub interaction_id: String,
    /// The notice message the button belongs to.
    pub message: Option<MessageRef>,
}

impl ApplyRequest {
    /// Callback payload that raises this request again.
    pub fn callback_data(&self) -> String {
        format!("{APPLY_CALLBACK_PREFIX}{}", self.guid)
    }

    /// Extract the posting id from an apply button payload.
    pub fn guid_from_callback(data: &str) -> Option<&str> {
        data.strip_prefix(APPLY_CALLBACK_PREFIX)
            .filter(|guid| !guid.is_empty())
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// HTML-escape `text` into at most `budget` characters.
pub(crate) fn escape_html_within(text: &str, budget: usize) -> String {
    fit_text(text, budget, escape_html)
}

/// Escape `text` into at most `budget` characters, ending with `…` when cut.
///
/// Characters are escaped one at a time, so a cut never lands inside an entity.
fn fit_text(text: &str, budget: usize, escape: fn(&str) -> String) -> String {
    let full = escape(text);
    if full.chars().count() <= budget {
        return full;
    }
    if budget == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let piece = escape(c.encode_utf8(&mut buf));
        let len = piece.chars().count();
        if used + len > budget - 1 {
            break;
        }
        out.push_str(&piece);
        used += len;
    }
    out.push('…');
    out
}

fn excerpt(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit).collect();
    format!("{}…", head.trim_end())
}
