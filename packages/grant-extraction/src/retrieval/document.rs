//! Document strategy: download a PDF and extract its text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use tracing::debug;

use super::{ContentHint, Retriever};
use crate::error::{ConfigError, RetrievalError, RetrievalResult};
use crate::types::content::{RawContent, StrategyKind};

/// Default download ceiling (20 MiB).
pub const DEFAULT_MAX_BYTES: usize = 20 * 1024 * 1024;

/// Downloads documents and extracts text on a blocking thread.
pub struct DocumentFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl DocumentFetcher {
    pub fn new() -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            client,
            max_bytes: DEFAULT_MAX_BYTES,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn download(&self, url: &str) -> RetrievalResult<Vec<u8>> {
        let mut response = self
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

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(bytes) = declared.filter(|b| *b > self.max_bytes) {
            return Err(RetrievalError::TooLarge { bytes });
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0));
        while let Some(chunk) = response.chunk().await.map_err(RetrievalError::transport)? {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_bytes {
                return Err(RetrievalError::TooLarge { bytes: body.len() });
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl Retriever for DocumentFetcher {
    async fn retrieve(&self, url: &str) -> RetrievalResult<RawContent> {
        let bytes = self.download(url).await?;
        debug!(url = %url, bytes = bytes.len(), "downloaded document");

        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;

        Ok(RawContent::new(url, normalize_whitespace(&text), StrategyKind::Document))
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Document
    }

    fn accepts(&self, _url: &str, hint: ContentHint) -> bool {
        hint == ContentHint::Document
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}

/// Collapse runs of blank lines and trailing spaces left by text extraction.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        let text = "Title   \n\n\n\nBody line\n   \n\nEnd";
        assert_eq!(normalize_whitespace(text), "Title\n\nBody line\n\nEnd");
    }

    #[test]
    fn test_accepts_documents_only() {
        let fetcher = DocumentFetcher::new().unwrap();
        assert!(fetcher.accepts("https://x.org/a.pdf", ContentHint::Document));
        assert!(!fetcher.accepts("https://x.org/grants", ContentHint::Page));
        assert_eq!(fetcher.timeout(), Some(Duration::from_secs(30)));
    }
}
