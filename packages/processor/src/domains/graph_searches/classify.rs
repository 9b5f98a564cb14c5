//! Derive the search type and canonical name from a raw target.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::models::GraphSearchType;
use crate::common::sanitizer::{sanitize_text, sanitize_url, sanitize_word};
use crate::common::{ProcessorError, Result};
use crate::kernel::BaseUrlScraper;

lazy_static! {
    static ref URL_PREFIX_REGEX: Regex = Regex::new(r"(?i)^https?://").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: GraphSearchType,
    pub name: String,
}

/// Classify `raw_name` by its leading characters.
///
/// URLs are probed with a HEAD request; a content type starting with any of
/// `blocked_mimes` rejects the target.
pub async fn classify(
    raw_name: &str,
    blocked_mimes: &[String],
    scraper: &dyn BaseUrlScraper,
) -> Result<Classification> {
    let trimmed = raw_name.trim();

    let (kind, name) = if URL_PREFIX_REGEX.is_match(trimmed) {
        let mime = scraper.resolve_type(trimmed).await?;
        debug!(url = %trimmed, mime = %mime, "Resolved URL content type");

        if blocked_mimes.iter().any(|blocked| mime.starts_with(blocked.as_str())) {
            return Err(ProcessorError::UnsupportedMediaKind {
                mime,
                blocked: blocked_mimes.to_vec(),
            });
        }
        (GraphSearchType::Url, sanitize_url(trimmed))
    } else if let Some(sigil) = trimmed.chars().next().filter(|c| matches!(c, '@' | '#' | '$')) {
        let kind = match sigil {
            '@' => GraphSearchType::Mention,
            '#' => GraphSearchType::Hashtag,
            _ => GraphSearchType::Cashtag,
        };
        let word = sanitize_word(trimmed);
        if word.is_empty() {
            return Err(ProcessorError::InvalidName(raw_name.to_string()));
        }
        (kind, format!("{sigil}{word}"))
    } else {
        (GraphSearchType::Keyword, sanitize_text(trimmed))
    };

    if name.is_empty() {
        return Err(ProcessorError::InvalidName(raw_name.to_string()));
    }

    Ok(Classification { kind, name })
}
