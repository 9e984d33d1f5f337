//! Retrieval chain: ordered fallback strategies that turn a URL into text.
//!
//! Strategies run one at a time in priority order, each under its own
//! timeout. The chain stops at the first strategy whose content clears the
//! minimum length. Failures (timeout, bad status, short body) fall through
//! to the next eligible strategy; when none is left the chain returns a
//! [`RetrievalFailure`] carrying every attempt.
//!
//! Available strategies:
//! - [`TavilyExtract`] - hosted extraction service
//! - [`PageFetcher`] - direct fetch with HTML-to-markdown conversion
//! - [`DocumentFetcher`] - downloadable document text extraction
//! - [`RateLimited`] - quota wrapper for any of the above

pub mod document;
pub mod http;
pub mod rate_limited;
pub mod tavily;

pub use document::DocumentFetcher;
pub use http::PageFetcher;
pub use rate_limited::{RateLimited, RetrieverExt};
pub use tavily::TavilyExtract;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{RetrievalError, RetrievalFailure, RetrievalResult};
use crate::types::content::{RawContent, StrategyKind};

/// What the chain currently believes a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentHint {
    Page,
    Document,
}

impl ContentHint {
    /// Guess from the URL alone.
    pub fn for_url(url: &str) -> Self {
        if looks_like_document(url) {
            Self::Document
        } else {
            Self::Page
        }
    }
}

/// Whether a URL names a downloadable document rather than a page.
pub fn looks_like_document(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let path = lower
        .split(['?', '#'])
        .next()
        .unwrap_or(lower.as_str());
    path.ends_with(".pdf") || lower.contains("/pdf/") || lower.contains(".pdf?")
}

/// One way of obtaining content for a URL.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetch content for a URL.
    async fn retrieve(&self, url: &str) -> RetrievalResult<RawContent>;

    /// Which strategy this is.
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy should run for a URL with the given hint.
    fn accepts(&self, _url: &str, _hint: ContentHint) -> bool {
        true
    }

    /// Timeout override. `None` uses the chain default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Name for logging.
    fn name(&self) -> &str {
        self.kind().as_str()
    }
}

#[async_trait]
impl<R: Retriever + ?Sized> Retriever for Arc<R> {
    async fn retrieve(&self, url: &str) -> RetrievalResult<RawContent> {
        (**self).retrieve(url).await
    }

    fn kind(&self) -> StrategyKind {
        (**self).kind()
    }

    fn accepts(&self, url: &str, hint: ContentHint) -> bool {
        (**self).accepts(url, hint)
    }

    fn timeout(&self) -> Option<Duration> {
        (**self).timeout()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Ordered list of retrieval strategies.
pub struct RetrievalChain {
    strategies: Vec<Arc<dyn Retriever>>,
    min_content_chars: usize,
    default_timeout: Duration,
}

impl Default for RetrievalChain {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalChain {
    /// Empty chain with a 200-char threshold and 15s default timeout.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            min_content_chars: 200,
            default_timeout: Duration::from_secs(15),
        }
    }

    /// Append a strategy at the lowest priority.
    pub fn with_strategy(mut self, strategy: impl Retriever + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn with_min_content_chars(mut self, min: usize) -> Self {
        self.min_content_chars = min;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy kinds in priority order.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Run the chain for a URL.
    pub async fn retrieve(&self, url: &str) -> Result<RawContent, RetrievalFailure> {
        let mut hint = ContentHint::for_url(url);
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            if !strategy.accepts(url, hint) {
                debug!(url = %url, strategy = %kind, ?hint, "strategy not eligible");
                continue;
            }

            let limit = strategy.timeout().unwrap_or(self.default_timeout);
            let outcome = match tokio::time::timeout(limit, strategy.retrieve(url)).await {
                Ok(result) => result.and_then(|content| self.check_length(content)),
                Err(_) => Err(RetrievalError::Timeout(limit)),
            };

            match outcome {
                Ok(content) => {
                    let content = content.classified();
                    debug!(
                        url = %url,
                        strategy = %kind,
                        chars = content.char_count(),
                        kind = ?content.kind,
                        "retrieved content"
                    );
                    return Ok(content);
                }
                Err(e) => {
                    if matches!(e, RetrievalError::DocumentContent { .. }) {
                        hint = ContentHint::Document;
                    }
                    warn!(url = %url, strategy = %kind, error = %e, "retrieval strategy failed");
                    attempts.push((kind, e));
                }
            }
        }

        Err(RetrievalFailure {
            url: url.to_string(),
            attempts,
        })
    }

    fn check_length(&self, content: RawContent) -> RetrievalResult<RawContent> {
        let chars = content.char_count();
        if chars < self.min_content_chars {
            return Err(RetrievalError::EmptyBody {
                chars,
                min: self.min_content_chars,
            });
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockResponse, MockRetriever};
    use crate::types::content::ContentKind;

    fn long_text(marker: &str) -> String {
        format!("{marker} {}", "grant funding details ".repeat(20))
    }

    #[test]
    fn test_document_detection() {
        assert!(looks_like_document("https://x.org/files/guide.pdf"));
        assert!(looks_like_document("https://x.org/files/guide.PDF#page=2"));
        assert!(looks_like_document("https://x.org/pdf/guide"));
        assert!(looks_like_document("https://x.org/guide.pdf?download=1"));
        assert!(!looks_like_document("https://x.org/grants/pdfs-explained"));
        assert!(!looks_like_document("https://x.org/grants"));
    }

    #[tokio::test]
    async fn test_fallthrough_stops_at_first_success() {
        let url = "https://example.org/grant";
        let hosted = Arc::new(
            MockRetriever::new(StrategyKind::HostedExtract).with_response(url, MockResponse::Status(503)),
        );
        let fetch = Arc::new(
            MockRetriever::new(StrategyKind::PageFetch)
                .with_response(url, MockResponse::Text(long_text("page"))),
        );
        let document = Arc::new(MockRetriever::new(StrategyKind::Document));

        let chain = RetrievalChain::new()
            .with_strategy(hosted.clone())
            .with_strategy(fetch.clone())
            .with_strategy(document.clone());

        let content = chain.retrieve(url).await.unwrap();
        assert_eq!(content.strategy, StrategyKind::PageFetch);
        assert_eq!(hosted.call_count(), 1);
        assert_eq!(fetch.call_count(), 1);
        assert_eq!(document.call_count(), 0);
    }

    #[tokio::test]
    async fn test_short_body_falls_through() {
        let url = "https://example.org/grant";
        let chain = RetrievalChain::new()
            .with_strategy(
                MockRetriever::new(StrategyKind::HostedExtract)
                    .with_response(url, MockResponse::Text("tiny".into())),
            )
            .with_strategy(
                MockRetriever::new(StrategyKind::PageFetch)
                    .with_response(url, MockResponse::Text(long_text("full"))),
            );

        let content = chain.retrieve(url).await.unwrap();
        assert_eq!(content.strategy, StrategyKind::PageFetch);
        assert!(content.text.starts_with("full"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_strategy_times_out() {
        let url = "https://example.org/slow";
        let chain = RetrievalChain::new()
            .with_default_timeout(Duration::from_secs(5))
            .with_strategy(MockRetriever::new(StrategyKind::HostedExtract).with_response(url, MockResponse::Hang))
            .with_strategy(MockRetriever::new(StrategyKind::PageFetch).with_response(url, MockResponse::Hang));

        let failure = chain.retrieve(url).await.unwrap_err();
        assert_eq!(failure.attempts.len(), 2);
        assert_eq!(failure.last_strategy(), Some(StrategyKind::PageFetch));
        assert!(matches!(
            failure.last_cause(),
            Some(RetrievalError::Timeout(d)) if *d == Duration::from_secs(5)
        ));
    }

    #[tokio::test]
    async fn test_document_content_promotes_hint() {
        let url = "https://example.org/download?id=7";
        let document = Arc::new(
            MockRetriever::new(StrategyKind::Document)
                .documents_only()
                .with_response(url, MockResponse::Text(long_text("pdf"))),
        );
        let chain = RetrievalChain::new()
            .with_strategy(
                MockRetriever::new(StrategyKind::PageFetch)
                    .pages_only()
                    .with_response(url, MockResponse::DocumentContent),
            )
            .with_strategy(document.clone());

        let content = chain.retrieve(url).await.unwrap();
        assert_eq!(content.strategy, StrategyKind::Document);
        assert_eq!(content.kind, ContentKind::Document);
        assert_eq!(document.call_count(), 1);
    }

    #[tokio::test]
    async fn test_document_strategy_skipped_for_pages() {
        let url = "https://example.org/grant";
        let document = Arc::new(MockRetriever::new(StrategyKind::Document).documents_only());
        let chain = RetrievalChain::new()
            .with_strategy(MockRetriever::new(StrategyKind::PageFetch).with_response(url, MockResponse::Status(404)))
            .with_strategy(document.clone());

        let failure = chain.retrieve(url).await.unwrap_err();
        assert_eq!(failure.attempts.len(), 1);
        assert_eq!(document.call_count(), 0);
        assert!(matches!(
            failure.last_cause(),
            Some(RetrievalError::Status { status: 404 })
        ));
    }

    #[tokio::test]
    async fn test_list_pages_are_classified() {
        let url = "https://example.org/funding";
        let listing = "# Funding programs\n\
            ## Arts Access Grant\nDeadline: 2026-03-01. Supports community arts groups.\n\
            ## Rural Startup Loan\nDeadline: 2026-04-15. Low-interest loans for rural founders.\n\
            ## Youth Employment Subsidy\nDeadline: 2026-05-30. Wage support for hiring youth.\n";
        let chain = RetrievalChain::new()
            .with_min_content_chars(50)
            .with_strategy(
                MockRetriever::new(StrategyKind::HostedExtract)
                    .with_response(url, MockResponse::Text(listing.to_string())),
            );

        let content = chain.retrieve(url).await.unwrap();
        assert_eq!(content.kind, ContentKind::ListPage);
    }
}
