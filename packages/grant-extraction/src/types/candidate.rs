//! Candidate URLs produced by the discovery stage.

use serde::{Deserialize, Serialize};
use url::Url;

/// A web address believed to host a grant opportunity.
///
/// Immutable once produced; the orchestrator consumes each one exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUrl {
    /// The URL as discovered
    pub url: String,

    /// 1-based position in the discovery ranking (1 = best)
    pub discovery_rank: usize,

    /// The search query that surfaced this URL, if any
    #[serde(default)]
    pub query: Option<String>,

    /// Title reported by the discovery source, if any
    #[serde(default)]
    pub title: Option<String>,
}

impl CandidateUrl {
    /// Create a candidate with its discovery rank.
    pub fn new(url: impl Into<String>, discovery_rank: usize) -> Self {
        Self {
            url: url.into(),
            discovery_rank,
            query: None,
            title: None,
        }
    }

    /// Record the originating query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Record the title reported by the discovery source.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Build candidates from an ordered URL list, ranked 1..K.
    pub fn ranked<I, S>(urls: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(i, url)| Self::new(url, i + 1))
            .collect()
    }

    /// Parse the URL, accepting only http and https.
    pub fn parsed(&self) -> Option<Url> {
        Url::parse(self.url.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
    }

    /// Normalized form used for de-duplication: fragment dropped.
    pub fn dedupe_key(&self) -> String {
        match self.parsed() {
            Some(mut url) => {
                url.set_fragment(None);
                url.to_string()
            }
            None => self.url.trim().to_string(),
        }
    }
}
