//! Direct page fetch strategy.
//!
//! Uses reqwest for the request, scraper to pick the main content and drop
//! boilerplate, and htmd for HTML to Markdown conversion. No JavaScript
//! rendering, so script-built pages come back short and fall through.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use scraper::{Html, Selector};

use super::{ContentHint, Retriever};
use crate::error::{ConfigError, RetrievalError, RetrievalResult};
use crate::types::content::{RawContent, StrategyKind};

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
    ".main",
    ".post-content",
    ".entry-content",
];

const BOILERPLATE_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    ".nav",
    ".navbar",
    ".sidebar",
    ".menu",
    ".advertisement",
    ".cookie-banner",
    "#nav",
    "#header",
    "#footer",
    "#sidebar",
    "script",
    "style",
    "noscript",
    "iframe",
    "form",
];

/// Fetches a page and converts its main content to markdown.
pub struct PageFetcher {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl PageFetcher {
    pub fn new() -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Retriever for PageFetcher {
    async fn retrieve(&self, url: &str) -> RetrievalResult<RawContent> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(RetrievalError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if is_document_type(&content_type) {
            return Err(RetrievalError::DocumentContent { content_type });
        }

        let html = response.text().await.map_err(RetrievalError::transport)?;
        let (title, markdown) = html_to_markdown_page(&html);

        let content = RawContent::new(url, markdown, StrategyKind::PageFetch);
        Ok(match title {
            Some(title) => content.with_title(title),
            None => content,
        })
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::PageFetch
    }

    fn accepts(&self, _url: &str, hint: ContentHint) -> bool {
        hint == ContentHint::Page
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

fn is_document_type(content_type: &str) -> bool {
    content_type.starts_with("application/pdf") || content_type.starts_with("application/x-pdf")
}

/// Title and markdown body for an HTML document.
fn html_to_markdown_page(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);
    let title = extract_title(&document);
    let main = strip_boilerplate(&extract_main_content(&document));
    (title, html_to_markdown(&main))
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Main content HTML, falling back to the body, then the whole document.
fn extract_main_content(document: &Html) -> String {
    for selector in MAIN_SELECTORS.iter().filter_map(|s| Selector::parse(s).ok()) {
        if let Some(main) = document.select(&selector).next() {
            return main.html();
        }
    }

    Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next().map(|b| b.html()))
        .unwrap_or_else(|| document.html())
}

fn strip_boilerplate(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut result = html.to_string();
    for selector in BOILERPLATE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
    {
        for element in fragment.select(&selector) {
            result = result.replace(&element.html(), "");
        }
    }
    result
}

fn html_to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| {
        Html::parse_fragment(html)
            .root_element()
            .text()
            .collect::<Vec<_>>()
            .join(" ")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_content_wins_over_chrome() {
        let html = r#"<html><head><title>Arts Grant</title></head><body>
            <nav>Home | About</nav>
            <main><h1>Arts Grant</h1><p>Funding for local artists.</p>
            <script>track()</script></main>
            <footer>Copyright</footer></body></html>"#;

        let (title, markdown) = html_to_markdown_page(html);
        assert_eq!(title.as_deref(), Some("Arts Grant"));
        assert!(markdown.contains("Funding for local artists."));
        assert!(!markdown.contains("Home | About"));
        assert!(!markdown.contains("Copyright"));
        assert!(!markdown.contains("track()"));
    }

    #[test]
    fn test_body_fallback_strips_boilerplate() {
        let html = r#"<html><body><header>Site header</header>
            <div><p>Apply by March 1.</p></div><aside>Related links</aside></body></html>"#;

        let (title, markdown) = html_to_markdown_page(html);
        assert!(title.is_none());
        assert!(markdown.contains("Apply by March 1."));
        assert!(!markdown.contains("Site header"));
        assert!(!markdown.contains("Related links"));
    }

    #[test]
    fn test_document_content_types() {
        assert!(is_document_type("application/pdf"));
        assert!(is_document_type("application/pdf; charset=binary"));
        assert!(!is_document_type("text/html; charset=utf-8"));
    }

    #[test]
    fn test_declines_document_hint() {
        let fetcher = PageFetcher::new().unwrap();
        assert!(fetcher.accepts("https://x.org", ContentHint::Page));
        assert!(!fetcher.accepts("https://x.org/a.pdf", ContentHint::Document));
    }
}
