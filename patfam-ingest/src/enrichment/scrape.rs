//! Live scrape of a public patent page
//!
//! `GET <base>/patent/<DOC>/en`. Text is captured from an element marked
//! `itemprop="claims"` / `data-section="claims"` (or the description
//! equivalents) up to the next closing `section` or `div`.

use super::{FullText, FullTextSource};
use crate::error::EnrichmentError;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<(/?)([A-Za-z][A-Za-z0-9-]*)([^>]*)>").expect("valid tag regex"))
}

fn section_attr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:itemprop|data-section)\s*=\s*["'](claims|description)["']"#)
            .expect("valid section attribute regex")
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    Off,
    Claims,
    Description,
}

pub struct ScrapeSource {
    client: reqwest::Client,
    base_url: String,
}

impl ScrapeSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("patfam/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Unavailable(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FullTextSource for ScrapeSource {
    fn name(&self) -> &'static str {
        "scrape"
    }

    async fn fetch(&self, document_number: &str) -> Result<FullText, EnrichmentError> {
        let url = format!("{}/patent/{}/en", self.base_url, document_number);
        debug!(url = %url, "Scraping full text");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EnrichmentError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(EnrichmentError::Unavailable(format!("HTTP {} for {}", status, url)));
        }
        let html = response
            .text()
            .await
            .map_err(|e| EnrichmentError::Unavailable(e.to_string()))?;

        let text = extract_sections(&html);
        if text.is_empty() {
            return Err(EnrichmentError::NotFound(document_number.to_string()));
        }
        Ok(text)
    }
}

/// Pull claims and description text out of a patent page
pub fn extract_sections(html: &str) -> FullText {
    let mut claims: Vec<String> = Vec::new();
    let mut description: Vec<String> = Vec::new();
    let mut capture = Capture::Off;
    let mut cursor = 0;

    let mut push_text = |capture: Capture, raw: &str| {
        let text = decode_entities(raw);
        if text.is_empty() {
            return;
        }
        match capture {
            Capture::Claims => claims.push(text),
            Capture::Description => description.push(text),
            Capture::Off => {}
        }
    };

    for caps in tag_pattern().captures_iter(html) {
        let Some(tag) = caps.get(0) else { continue };
        push_text(capture, &html[cursor..tag.start()]);
        cursor = tag.end();

        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        if closing {
            if name == "section" || name == "div" {
                capture = Capture::Off;
            }
            continue;
        }

        let section = caps
            .get(3)
            .and_then(|attrs| section_attr_pattern().captures(attrs.as_str()))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_ascii_lowercase());
        match section.as_deref() {
            Some("claims") => capture = Capture::Claims,
            Some(_) => capture = Capture::Description,
            None => {}
        }
    }
    push_text(capture, &html[cursor..]);

    let join = |parts: Vec<String>| (!parts.is_empty()).then(|| parts.join("\n"));
    FullText {
        claims: join(claims),
        description: join(description),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
<section itemprop="claims"><div class="claim">1. A cyclic peptide &amp; library.</div>
<div class="claim">2. The library of claim 1.</div></section>
<section data-section="description"><p>Background of the invention.</p></section>
</body></html>"#;

    #[test]
    fn test_extract_sections() {
        let text = extract_sections(PAGE);
        assert_eq!(text.claims.as_deref(), Some("1. A cyclic peptide & library."));
        assert_eq!(text.description.as_deref(), Some("Background of the invention."));
    }

    #[test]
    fn test_page_without_sections_is_empty() {
        assert!(extract_sections("<html><p>nothing here</p></html>").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_from_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/patent/US1234567B2/en"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let source = ScrapeSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let text = source.fetch("US1234567B2").await.unwrap();
        assert!(text.claims.is_some());
    }

    #[tokio::test]
    async fn test_http_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = ScrapeSource::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert!(matches!(
            source.fetch("US1").await,
            Err(EnrichmentError::Unavailable(_))
        ));
    }
}
