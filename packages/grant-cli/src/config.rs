//! Runtime configuration for the grant-seeker binary.
//!
//! Settings come from the environment (after `.env` is loaded) and can be
//! overridden per invocation with flags.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use grant_extraction::model::openai::DEFAULT_MODEL;
use grant_extraction::{OngoingDeadlinePolicy, PipelineConfig};

pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Flags that override the matching `GRANT_*` variable.
#[derive(Debug, Default, Args)]
pub struct Overrides {
    /// Maximum URLs retrieved or extracted at once
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Maximum URLs processed per batch
    #[arg(long, global = true)]
    pub max_batch: Option<usize>,

    #[arg(long, global = true)]
    pub cache_ttl_hours: Option<u64>,

    /// Retries of the retrieval chain after the first failure
    #[arg(long, global = true)]
    pub retry_count: Option<u32>,

    #[arg(long, global = true)]
    pub retry_backoff_ms: Option<u64>,

    #[arg(long, global = true)]
    pub min_description_chars: Option<usize>,

    /// How rolling deadlines count toward viability (valid | uncertain)
    #[arg(long, global = true)]
    pub ongoing_deadlines: Option<OngoingDeadlinePolicy>,

    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Chat model used for extraction
    #[arg(long, global = true)]
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub cache_dir: PathBuf,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut pipeline = PipelineConfig::default();

        if let Some(concurrency) = parse_var(&lookup, "GRANT_CONCURRENCY")? {
            pipeline.concurrency = concurrency;
        }
        if let Some(max) = parse_var(&lookup, "GRANT_MAX_BATCH")? {
            pipeline.max_batch_size = max;
        }
        if let Some(hours) = parse_var::<u64>(&lookup, "GRANT_CACHE_TTL_HOURS")? {
            pipeline.cache_ttl = hours_to_duration(hours);
        }
        if let Some(count) = parse_var(&lookup, "GRANT_RETRY_COUNT")? {
            pipeline.retry_count = count;
        }
        if let Some(ms) = parse_var(&lookup, "GRANT_RETRY_BACKOFF_MS")? {
            pipeline.retry_backoff_base = Duration::from_millis(ms);
        }
        if let Some(min) = parse_var(&lookup, "GRANT_MIN_DESCRIPTION_CHARS")? {
            pipeline.min_description_chars = min;
        }
        if let Some(policy) = parse_var(&lookup, "GRANT_ONGOING_DEADLINES")? {
            pipeline.ongoing_deadline_policy = policy;
        }

        let cache_dir = non_blank(&lookup, "GRANT_CACHE_DIR")
            .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string())
            .into();
        let model = non_blank(&lookup, "OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            pipeline,
            cache_dir,
            model,
        })
    }

    /// Apply flag values on top of the environment.
    pub fn with_overrides(mut self, flags: &Overrides) -> Self {
        if let Some(concurrency) = flags.concurrency {
            self.pipeline.concurrency = concurrency;
        }
        if let Some(max) = flags.max_batch {
            self.pipeline.max_batch_size = max;
        }
        if let Some(hours) = flags.cache_ttl_hours {
            self.pipeline.cache_ttl = hours_to_duration(hours);
        }
        if let Some(count) = flags.retry_count {
            self.pipeline.retry_count = count;
        }
        if let Some(ms) = flags.retry_backoff_ms {
            self.pipeline.retry_backoff_base = Duration::from_millis(ms);
        }
        if let Some(min) = flags.min_description_chars {
            self.pipeline.min_description_chars = min;
        }
        if let Some(policy) = flags.ongoing_deadlines {
            self.pipeline.ongoing_deadline_policy = policy;
        }
        if let Some(dir) = &flags.cache_dir {
            self.cache_dir = dir.clone();
        }
        if let Some(model) = &flags.model {
            self.model = model.clone();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline
            .validate()
            .context("Invalid pipeline configuration")
    }
}

fn hours_to_duration(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_blank(lookup, name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a valid value, got `{raw}`")),
        None => Ok(None),
    }
}
