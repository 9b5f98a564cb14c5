//! Normalization of raw search targets before they are stored as job names.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();

    // Leading run of letters, digits and underscores (handles, tags, tickers)
    static ref WORD_REGEX: Regex = Regex::new(r"^[\p{L}\p{N}_]+").unwrap();
}

/// Trim, drop control characters and collapse whitespace runs.
pub fn sanitize_text(raw: &str) -> String {
    let without_controls: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    WHITESPACE_REGEX
        .replace_all(without_controls.trim(), " ")
        .into_owned()
}

/// Strip leading sigils (`@`, `#`, `$`) and keep the first word.
///
/// `"@Jack Dorsey"` becomes `"Jack"`, `"#launch!"` becomes `"launch"`.
pub fn sanitize_word(raw: &str) -> String {
    let stripped = raw
        .trim()
        .trim_start_matches(|c: char| matches!(c, '@' | '#' | '$'));
    WORD_REGEX
        .find(stripped)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Canonical form of a URL: parsed, without fragment. Unparsable input falls
/// back to the trimmed text.
pub fn sanitize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_collapses_whitespace_and_controls() {
        assert_eq!(sanitize_text("  climate \t\n change  "), "climate change");
        assert_eq!(sanitize_text("a\u{0007}b"), "a b");
    }

    #[test]
    fn word_strips_sigils_and_trailing_punctuation() {
        assert_eq!(sanitize_word("@foo"), "foo");
        assert_eq!(sanitize_word("#launch!"), "launch");
        assert_eq!(sanitize_word("$TSLA"), "TSLA");
        assert_eq!(sanitize_word("@@double"), "double");
        assert_eq!(sanitize_word("@Jack Dorsey"), "Jack");
    }

    #[test]
    fn word_keeps_unicode_letters() {
        assert_eq!(sanitize_word("#élection2022"), "élection2022");
    }

    #[test]
    fn word_of_only_sigils_is_empty() {
        assert_eq!(sanitize_word("#"), "");
        assert_eq!(sanitize_word("@ !"), "");
    }

    #[test]
    fn url_drops_fragment() {
        assert_eq!(
            sanitize_url(" https://example.com/a?b=1#section "),
            "https://example.com/a?b=1"
        );
    }

    #[test]
    fn unparsable_url_is_trimmed_only() {
        assert_eq!(sanitize_url(" http:// broken "), "http:// broken");
    }
}
