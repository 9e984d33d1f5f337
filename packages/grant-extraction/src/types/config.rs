//! Configuration for the extraction pipeline.
//!
//! Constructed once and passed into [`Orchestrator::new`](crate::pipeline::Orchestrator::new).
//! Nothing downstream reads environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted cache lifetime: one year.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Most permits a batch semaphore can hold.
pub const MAX_CONCURRENCY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// How an "ongoing"/rolling deadline counts toward viability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OngoingDeadlinePolicy {
    /// A rolling deadline is a real value
    #[default]
    Valid,
    /// A rolling deadline is treated as unknown
    Uncertain,
}

impl std::str::FromStr for OngoingDeadlinePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valid" => Ok(Self::Valid),
            "uncertain" => Ok(Self::Uncertain),
            other => Err(ConfigError::Invalid {
                field: "ongoing_deadline_policy",
                reason: format!("expected `valid` or `uncertain`, got `{other}`"),
            }),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum WorkItems retrieving or extracting at once.
    ///
    /// Default: 3.
    pub concurrency: usize,

    /// Hard ceiling on URLs processed per batch.
    ///
    /// Candidates past this (after de-duplication, in discovery order)
    /// are abandoned. Default: 5.
    pub max_batch_size: usize,

    /// Cache entry lifetime. Default: 24 hours.
    pub cache_ttl: Duration,

    /// Retries of the whole retrieval chain after its first failure.
    ///
    /// Default: 1.
    pub retry_count: u32,

    /// Backoff before retry `n` is `retry_backoff_base * 2^(n-1)`.
    ///
    /// Default: 1 second.
    pub retry_backoff_base: Duration,

    /// Minimum description length for a viable record. Default: 50.
    pub min_description_chars: usize,

    /// Retrieved text shorter than this fails the strategy. Default: 200.
    pub min_content_chars: usize,

    /// Per-strategy timeout, unless the strategy sets its own. Default: 15s.
    pub strategy_timeout: Duration,

    /// Timeout for one model extraction call. Default: 60s.
    pub extraction_timeout: Duration,

    /// Content is truncated to this many characters before extraction.
    ///
    /// Default: 12000.
    pub content_preview_chars: usize,

    #[serde(default)]
    pub ongoing_deadline_policy: OngoingDeadlinePolicy,

    /// Deadlines this many days out or further score zero urgency.
    ///
    /// Default: 180.
    pub urgency_horizon_days: u32,

    /// Drop duplicate URLs before any work is launched. Default: true.
    pub dedupe_urls: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_batch_size: 5,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            retry_count: 1,
            retry_backoff_base: Duration::from_secs(1),
            min_description_chars: 50,
            min_content_chars: 200,
            strategy_timeout: Duration::from_secs(15),
            extraction_timeout: Duration::from_secs(60),
            content_preview_chars: 12_000,
            ongoing_deadline_policy: OngoingDeadlinePolicy::Valid,
            urgency_horizon_days: 180,
            dedupe_urls: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set retry count and backoff base.
    pub fn with_retry(mut self, count: u32, backoff_base: Duration) -> Self {
        self.retry_count = count;
        self.retry_backoff_base = backoff_base;
        self
    }

    pub fn with_min_description_chars(mut self, min: usize) -> Self {
        self.min_description_chars = min;
        self
    }

    pub fn with_min_content_chars(mut self, min: usize) -> Self {
        self.min_content_chars = min;
        self
    }

    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub fn with_content_preview_chars(mut self, chars: usize) -> Self {
        self.content_preview_chars = chars;
        self
    }

    pub fn with_ongoing_deadline_policy(mut self, policy: OngoingDeadlinePolicy) -> Self {
        self.ongoing_deadline_policy = policy;
        self
    }

    pub fn with_dedupe_urls(mut self, dedupe: bool) -> Self {
        self.dedupe_urls = dedupe;
        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            }
        }

        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(invalid("concurrency", "exceeds the semaphore permit limit"));
        }
        if self.max_batch_size == 0 {
            return Err(invalid("max_batch_size", "must be at least 1"));
        }
        if self.cache_ttl < Duration::from_secs(1) {
            return Err(invalid("cache_ttl", "must be at least one second"));
        }
        if self.cache_ttl > MAX_CACHE_TTL {
            return Err(invalid("cache_ttl", "must be at most one year"));
        }
        if self.strategy_timeout.is_zero() {
            return Err(invalid("strategy_timeout", "must be positive"));
        }
        if self.extraction_timeout.is_zero() {
            return Err(invalid("extraction_timeout", "must be positive"));
        }
        if self.min_content_chars == 0 {
            return Err(invalid("min_content_chars", "must be at least 1"));
        }
        if self.content_preview_chars == 0 {
            return Err(invalid("content_preview_chars", "must be at least 1"));
        }
        Ok(())
    }
}
