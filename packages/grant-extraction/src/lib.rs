//! Grant Opportunity Extraction Library
//!
//! Turns candidate URLs into ranked, structured grant records: every URL is
//! retrieved through an ordered chain of strategies, its content handed to a
//! model for field extraction, the result checked for minimum completeness,
//! and the surviving records ranked together.
//!
//! # Design Philosophy
//!
//! - One bad URL never sinks a batch: per-item failures are reported, not raised
//! - Concurrency is bounded by permits, not by hoping upstreams cope
//! - Only successes are cached; a failing URL is retried on the next run
//! - Configuration is explicit and validated once, at construction
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grant_extraction::{
//!     Cache, CandidateUrl, FileBackend, Orchestrator, PageFetcher, PipelineConfig,
//!     RetrievalChain,
//! };
//! use grant_extraction::testing::MockModel;
//!
//! let cache = Arc::new(Cache::new(FileBackend::open(".cache").await?));
//! let chain = RetrievalChain::new().with_strategy(PageFetcher::new()?);
//! let orchestrator = Orchestrator::new(PipelineConfig::default(), chain, MockModel::new(), cache)?;
//!
//! let report = orchestrator
//!     .run(CandidateUrl::ranked(["https://example.org/grants/garden"]), Some("garden grants"))
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Candidate URLs, raw content, grant records, configuration
//! - [`cache`] - TTL cache with memory, file and sqlite backends
//! - [`retrieval`] - Retrieval chain and strategies
//! - [`extract`] - Model-backed extraction and normalization
//! - [`filter`] - Viability gate and result refinement
//! - [`rank`] - Composite ranking
//! - [`pipeline`] - Bounded-concurrency orchestrator
//! - [`discovery`] - Query to candidate URLs
//! - [`model`] - Model inference clients
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod cache;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod filter;
pub mod model;
pub mod pipeline;
pub mod rank;
pub mod retrieval;
pub mod security;
pub mod testing;
pub mod types;

// Re-export core types at crate root
pub use error::{
    CacheError, ConfigError, DiscoveryError, ExtractionFailure, ModelError, PipelineError,
    RetrievalError, RetrievalFailure,
};
pub use types::{
    candidate::CandidateUrl,
    config::{OngoingDeadlinePolicy, PipelineConfig},
    content::{ContentKind, RawContent, StrategyKind},
    record::{
        Deadline, Demographic, Field, FundingType, GrantRecord, RejectReason, Viability,
        SCHEMA_VERSION,
    },
};

// Re-export cache
pub use cache::{Cache, CacheBackend, CacheKey, Clock, FileBackend, MemoryBackend, SystemClock};

#[cfg(feature = "sqlite")]
pub use cache::SqliteBackend;

// Re-export retrieval
pub use retrieval::{
    ContentHint, DocumentFetcher, PageFetcher, RateLimited, RetrievalChain, Retriever,
    RetrieverExt, TavilyExtract,
};

// Re-export extraction, filtering and ranking
pub use extract::{ExtractionContext, ExtractionMode, Extractor};
pub use filter::{ResultFilters, ViabilityFilter};
pub use rank::Ranker;

// Re-export pipeline
pub use pipeline::{BatchReport, FailureReason, ItemReport, Orchestrator, RetryPolicy, WorkState};

// Re-export discovery and model clients
pub use discovery::{discover_variants, Discovery, TavilyDiscovery};
pub use model::{ModelClient, ModelRequest, OpenAiModel};

pub use security::{Credentials, SecretString};
