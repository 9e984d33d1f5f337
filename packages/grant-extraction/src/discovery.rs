//! Discovery stage: turn a query into ranked candidate URLs.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, DiscoveryError};
use crate::security::SecretString;
use crate::types::candidate::CandidateUrl;

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

/// A source of candidate URLs for a query.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Up to `limit` candidates, ranked 1..K (1 = best).
    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<CandidateUrl>, DiscoveryError>;

    fn name(&self) -> &str {
        "discovery"
    }
}

/// Run several query variants and merge their candidates.
///
/// Earlier variants rank first; a URL seen in an earlier variant keeps its
/// first position. A failing variant is skipped.
pub async fn discover_variants<D: Discovery + ?Sized>(
    discovery: &D,
    queries: &[&str],
    limit_per_query: usize,
) -> Vec<CandidateUrl> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for query in queries {
        match discovery.discover(query, limit_per_query).await {
            Ok(candidates) => {
                for candidate in candidates {
                    if seen.insert(candidate.dedupe_key()) {
                        merged.push(candidate);
                    }
                }
            }
            Err(e) => {
                warn!(query = %query, source = discovery.name(), error = %e, "discovery query failed");
            }
        }
    }

    for (index, candidate) in merged.iter_mut().enumerate() {
        candidate.discovery_rank = index + 1;
    }
    merged
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    score: f64,
}

/// Discovery through Tavily search.
pub struct TavilyDiscovery {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    search_depth: String,
}

impl TavilyDiscovery {
    pub fn new(api_key: SecretString) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            search_depth: "basic".to_string(),
        })
    }

    /// Set search depth ("basic" or "advanced").
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Discovery for TavilyDiscovery {
    async fn discover(&self, query: &str, limit: usize) -> Result<Vec<CandidateUrl>, DiscoveryError> {
        let request = SearchRequest {
            query,
            search_depth: &self.search_depth,
            max_results: limit,
            include_answer: false,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", self.api_key.bearer())
            .json(&request)
            .send()
            .await
            .map_err(|e| DiscoveryError::Http(Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Http(Box::new(e)))?;

        let candidates = results_to_candidates(body.results, query, limit);
        debug!(query = %query, found = candidates.len(), "tavily search complete");
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "tavily_search"
    }
}

/// Order by score, best first, and rank 1..K.
fn results_to_candidates(mut results: Vec<SearchResult>, query: &str, limit: usize) -> Vec<CandidateUrl> {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(index, result)| {
            let candidate = CandidateUrl::new(result.url, index + 1).with_query(query);
            match result.title {
                Some(title) => candidate.with_title(title),
                None => candidate,
            }
        })
        .collect()
}
