//! Typed errors for the grant extraction pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so every failure family
//! stays strongly typed. Only [`ConfigError`] is fatal; everything else is
//! absorbed by the orchestrator and degrades to "this URL yielded no record".

use std::time::Duration;

use thiserror::Error;

use crate::types::content::StrategyKind;

/// A single retrieval strategy failed for a URL.
///
/// Recoverable: the chain falls through to the next strategy.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The strategy did not answer within its timeout
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered with a non-success status
    #[error("HTTP status {status}")]
    Status { status: u16 },

    /// Connection, TLS or body read failure
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Content came back but is below the usable threshold
    #[error("empty body ({chars} chars, need {min})")]
    EmptyBody { chars: usize, min: usize },

    /// The response turned out to be a downloadable document
    #[error("document content ({content_type}) needs the document strategy")]
    DocumentContent { content_type: String },

    /// The document could not be decoded to text
    #[error("document decode failed: {0}")]
    Decode(String),

    /// The document exceeds the download ceiling
    #[error("document too large ({bytes} bytes)")]
    TooLarge { bytes: usize },

    /// Unexpected response shape from a hosted service
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl RetrievalError {
    /// Wrap any transport-level error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Every eligible strategy failed for a URL.
#[derive(Debug, Error)]
#[error("all retrieval strategies failed for {url}: {}", describe_last(.attempts))]
pub struct RetrievalFailure {
    /// URL that could not be retrieved
    pub url: String,

    /// Each strategy that ran, in order, with its failure
    pub attempts: Vec<(StrategyKind, RetrievalError)>,
}

impl RetrievalFailure {
    /// The cause reported by the last strategy that ran.
    pub fn last_cause(&self) -> Option<&RetrievalError> {
        self.attempts.last().map(|(_, e)| e)
    }

    /// The strategy that ran last.
    pub fn last_strategy(&self) -> Option<StrategyKind> {
        self.attempts.last().map(|(k, _)| *k)
    }
}

fn describe_last(attempts: &[(StrategyKind, RetrievalError)]) -> String {
    match attempts.last() {
        Some((kind, err)) => format!("{kind}: {err}"),
        None => "no eligible strategy".to_string(),
    }
}

/// Extraction failed for one URL. Recoverable by skipping that URL.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    /// The model service call failed
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    /// The model did not answer within the extraction timeout
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The model answered with something that is not a grant payload
    #[error("malformed model output: {0}")]
    Malformed(String),
}

/// Errors from the model inference service.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Network error (connection failed, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// API error (non-2xx response, rate limit, invalid request)
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response envelope could not be read
    #[error("parse error: {0}")]
    Parse(String),

    /// No scripted or generated answer
    #[error("empty response")]
    Empty,
}

/// Errors from the cache backends.
///
/// Never surfaced from reads: a failed or corrupt read is a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database backend failure
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Configuration problems. The only fatal error class, raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential is absent or blank
    #[error("missing credential: {0} must be set")]
    MissingCredential(&'static str),

    /// An option has a value the pipeline cannot run with
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A client could not be constructed from the configuration
    #[error("client setup failed: {0}")]
    Client(String),
}

/// Errors from the discovery stage.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Search request failed
    #[error("search request failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Search service answered with a non-success status
    #[error("search service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Batch-level errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The caller cancelled the batch before it finished
    #[error("batch cancelled")]
    Cancelled,
}

/// Result type alias for a single retrieval strategy.
pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;

/// Result type alias for cache writes.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
