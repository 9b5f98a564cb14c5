//! Link preview scraper - reqwest for HTTP, scraper for the OpenGraph tags
//!
//! Reads `og:*` meta tags, falling back to `<title>` and the plain
//! `description` meta tag. No JavaScript rendering.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::traits::{BaseUrlScraper, UrlPreview};
use crate::common::{ProcessorError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; graph-search-processor/0.1)";

pub struct OpenGraphScraper {
    client: reqwest::Client,
}

impl OpenGraphScraper {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    async fn fetch_html(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        response
            .text()
            .await
            .context("Failed to read response body")
    }
}

/// First `content` of a `<meta>` tag matching `property` or `name`.
fn meta_content(document: &Html, key: &str) -> Option<String> {
    let selector =
        Selector::parse(&format!(r#"meta[property="{key}"], meta[name="{key}"]"#)).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

fn title_tag(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Relative image paths are resolved against the page URL.
fn absolutize(base: &str, link: String) -> String {
    match Url::parse(base).and_then(|base| base.join(&link)) {
        Ok(url) => url.to_string(),
        Err(_) => link,
    }
}

/// Extract a preview from an HTML page.
pub fn parse_preview(url: &str, html: &str) -> UrlPreview {
    let document = Html::parse_document(html);

    let title = meta_content(&document, "og:title").or_else(|| title_tag(&document));
    let description = meta_content(&document, "og:description")
        .or_else(|| meta_content(&document, "description"));
    let site = meta_content(&document, "og:site_name")
        .or_else(|| Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)));
    let image = meta_content(&document, "og:image").map(|image| absolutize(url, image));
    let canonical = meta_content(&document, "og:url").unwrap_or_else(|| url.to_string());

    UrlPreview {
        url: canonical,
        title,
        description,
        site,
        image,
        scraped_at: Utc::now(),
    }
}

#[async_trait]
impl BaseUrlScraper for OpenGraphScraper {
    async fn resolve_type(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| ProcessorError::UrlScraper(anyhow!(e).context(format!("HEAD {url}"))))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        debug!(url = %url, content_type = %content_type, "Resolved content type");
        Ok(content_type)
    }

    async fn fetch_preview(&self, url: &str) -> Result<UrlPreview> {
        let html = self
            .fetch_html(url)
            .await
            .map_err(ProcessorError::UrlScraper)?;

        Ok(parse_preview(url, &html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title>Fallback title</title>
            <meta property="og:title" content="Launch day" />
            <meta name="description" content="Plain description" />
            <meta property="og:site_name" content="Example News" />
            <meta property="og:image" content="/img/cover.png" />
          </head>
          <body></body>
        </html>
    "#;

    #[test]
    fn prefers_open_graph_tags() {
        let preview = parse_preview("https://example.com/post/1", PAGE);
        assert_eq!(preview.title.as_deref(), Some("Launch day"));
        assert_eq!(preview.site.as_deref(), Some("Example News"));
        assert_eq!(preview.description.as_deref(), Some("Plain description"));
        assert_eq!(preview.url, "https://example.com/post/1");
    }

    #[test]
    fn relative_images_are_resolved() {
        let preview = parse_preview("https://example.com/post/1", PAGE);
        assert_eq!(
            preview.image.as_deref(),
            Some("https://example.com/img/cover.png")
        );
    }

    #[test]
    fn falls_back_to_title_tag_and_host() {
        let preview = parse_preview(
            "https://blog.example.org/a",
            "<html><head><title> Hello </title></head></html>",
        );
        assert_eq!(preview.title.as_deref(), Some("Hello"));
        assert_eq!(preview.site.as_deref(), Some("blog.example.org"));
        assert!(preview.image.is_none());
    }

    #[test]
    fn preview_serializes_scraped_at_in_camel_case() {
        let preview = parse_preview("https://example.com", "<html></html>");
        let value = serde_json::to_value(&preview).unwrap();
        assert!(value.get("scrapedAt").is_some());
    }
}
