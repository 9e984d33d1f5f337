//! Hosted extraction strategy backed by the Tavily extract API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Retriever;
use crate::error::{ConfigError, RetrievalError, RetrievalResult};
use crate::security::SecretString;
use crate::types::content::{RawContent, StrategyKind};

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/extract";

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    urls: [&'a str; 1],
    extract_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractResult>,
    #[serde(default)]
    failed_results: Vec<FailedResult>,
}

#[derive(Debug, Deserialize)]
struct ExtractResult {
    #[allow(dead_code)]
    url: String,
    #[serde(default)]
    raw_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FailedResult {
    #[serde(default)]
    error: Option<String>,
}

/// Retrieval through Tavily's content-extraction mode.
pub struct TavilyExtract {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    extract_depth: String,
    timeout: Option<Duration>,
}

impl TavilyExtract {
    pub fn new(api_key: SecretString) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            extract_depth: "basic".to_string(),
            timeout: None,
        })
    }

    /// Point at a different endpoint (proxy or test server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set extract depth ("basic" or "advanced").
    pub fn with_extract_depth(mut self, depth: impl Into<String>) -> Self {
        self.extract_depth = depth.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Retriever for TavilyExtract {
    async fn retrieve(&self, url: &str) -> RetrievalResult<RawContent> {
        let request = ExtractRequest {
            urls: [url],
            extract_depth: &self.extract_depth,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", self.api_key.bearer())
            .json(&request)
            .send()
            .await
            .map_err(RetrievalError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
            });
        }

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::UnexpectedResponse(e.to_string()))?;

        body_to_content(url, body)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::HostedExtract
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn name(&self) -> &str {
        "tavily_extract"
    }
}

fn body_to_content(url: &str, body: ExtractResponse) -> RetrievalResult<RawContent> {
    if let Some(text) = body
        .results
        .into_iter()
        .find_map(|r| r.raw_content.filter(|t| !t.trim().is_empty()))
    {
        return Ok(RawContent::new(url, text, StrategyKind::HostedExtract));
    }

    let reason = body
        .failed_results
        .into_iter()
        .find_map(|f| f.error)
        .unwrap_or_else(|| "no extracted content".to_string());
    Err(RetrievalError::UnexpectedResponse(reason))
}
