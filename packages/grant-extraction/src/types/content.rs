//! Raw content obtained by the retrieval chain.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which retrieval method produced a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Hosted search/extraction service (content-extraction mode)
    HostedExtract,
    /// Direct page fetch with HTML-to-text conversion
    PageFetch,
    /// Downloadable document text extraction
    Document,
}

impl StrategyKind {
    /// Confidence that content from this source reflects the real page (0.0-1.0).
    pub fn accessibility_confidence(self) -> f64 {
        match self {
            Self::HostedExtract => 1.0,
            Self::PageFetch => 0.8,
            Self::Document => 0.6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostedExtract => "hosted_extract",
            Self::PageFetch => "page_fetch",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of payload a URL turned out to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// A single page, presumably describing one opportunity
    HtmlPage,
    /// Text extracted from a downloadable document
    Document,
    /// A listing or portal page describing several opportunities
    ListPage,
    /// Nothing usable
    Empty,
}

impl ContentKind {
    /// Classify page text.
    ///
    /// Documents keep their kind. Page text is a list page when
    /// [`looks_like_listing`] holds.
    pub fn classify(text: &str, retrieved_as: ContentKind) -> Self {
        if text.trim().is_empty() {
            return Self::Empty;
        }
        if retrieved_as == Self::Document {
            return Self::Document;
        }

        if looks_like_listing(text) {
            Self::ListPage
        } else {
            Self::HtmlPage
        }
    }
}

/// Whether text describes several opportunities: at least three deadline
/// mentions across at least three headings or list items.
pub fn looks_like_listing(text: &str) -> bool {
    let deadline_mentions = deadline_pattern().find_iter(text).count();
    let sections = text
        .lines()
        .map(str::trim_start)
        .filter(|l| l.starts_with('#') || l.starts_with("- ") || l.starts_with("* "))
        .count();

    deadline_mentions >= 3 && sections >= 3
}

fn deadline_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(deadline|closing date|applications? due|apply by)\b")
            .expect("static regex")
    })
}

/// Text payload obtained for a URL.
///
/// Owned by exactly one in-flight work item and dropped after extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContent {
    /// URL the content was requested for
    pub url: String,

    /// Extracted text (markdown or plain text)
    pub text: String,

    /// Strategy that succeeded
    pub strategy: StrategyKind,

    /// Content-kind tag
    pub kind: ContentKind,

    /// Page title if the strategy found one
    #[serde(default)]
    pub title: Option<String>,

    /// When the content was fetched
    pub fetched_at: DateTime<Utc>,
}

impl RawContent {
    /// Create content retrieved by a strategy, tagged as a page.
    pub fn new(url: impl Into<String>, text: impl Into<String>, strategy: StrategyKind) -> Self {
        let kind = match strategy {
            StrategyKind::Document => ContentKind::Document,
            _ => ContentKind::HtmlPage,
        };
        Self {
            url: url.into(),
            text: text.into(),
            strategy,
            kind,
            title: None,
            fetched_at: Utc::now(),
        }
    }

    /// Set the page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Override the content kind.
    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of characters of usable text.
    pub fn char_count(&self) -> usize {
        self.text.trim().chars().count()
    }

    /// Re-derive the kind tag from the text.
    pub fn classified(mut self) -> Self {
        self.kind = ContentKind::classify(&self.text, self.kind);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_single_page() {
        let text = "# Community Garden Grant\n\nDeadline: 2026-05-15\n\nFunding for gardens.";
        assert_eq!(
            ContentKind::classify(text, ContentKind::HtmlPage),
            ContentKind::HtmlPage
        );
    }

    #[test]
    fn test_classify_list_page() {
        let text = "# Open Funding\n\
            ## Youth Arts Grant\nDeadline: 2026-03-01\n\
            ## Rural Broadband Fund\nApplications due 2026-04-01\n\
            ## Heritage Loan\nClosing date: 2026-06-30\n";
        assert_eq!(
            ContentKind::classify(text, ContentKind::HtmlPage),
            ContentKind::ListPage
        );
    }

    #[test]
    fn test_classify_document_and_empty() {
        assert_eq!(
            ContentKind::classify("deadline deadline deadline", ContentKind::Document),
            ContentKind::Document
        );
        assert_eq!(
            ContentKind::classify("   \n", ContentKind::HtmlPage),
            ContentKind::Empty
        );
    }

    #[test]
    fn test_document_strategy_tags_document() {
        let content = RawContent::new("https://x.org/a.pdf", "text", StrategyKind::Document);
        assert_eq!(content.kind, ContentKind::Document);
        assert_eq!(content.char_count(), 4);
    }
}
