//! Posting detail page extraction.

use scraper::{Html, Selector};

use super::error::PortalError;

/// Element holding the posting description.
const CONTENT_SELECTOR: &str = "div#etsMCContent";

/// Extract the description text from a posting page.
///
/// Text nodes are trimmed and joined with newlines; blank nodes are dropped.
pub fn extract_description(html: &str) -> Result<String, PortalError> {
    let selector =
        Selector::parse(CONTENT_SELECTOR).map_err(|e| PortalError::Parse(e.to_string()))?;
    let document = Html::parse_document(html);

    let content = document
        .select(&selector)
        .next()
        .ok_or_else(|| PortalError::Parse(format!("no `{CONTENT_SELECTOR}` element")))?;

    let text = content
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(text)
}
