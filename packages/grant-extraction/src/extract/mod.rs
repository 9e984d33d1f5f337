//! Extractor: raw page content to structured grant records.
//!
//! The field mapping itself is delegated to a [`ModelClient`]. The extractor
//! owns everything around that call:
//!
//! - branch on single page vs list page (list pages may yield many records)
//! - anchor the prompt to the extraction date
//! - parse and normalize the answer into [`GrantRecord`]s
//! - compute the query fit score locally

pub mod normalize;
pub mod prompts;
pub mod relevance;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ExtractionFailure;
use crate::model::{ModelClient, ModelRequest};
use crate::types::content::RawContent;
use crate::types::record::{Field, GrantRecord};

pub use prompts::{ExtractionMode, ModelGrant};

/// Per-call context for an extraction.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    /// Query the candidate was discovered for
    pub query: Option<String>,
    /// Discovery rank of the source URL
    pub discovery_rank: usize,
    /// Extraction time; deadlines are interpreted against its date
    pub now: DateTime<Utc>,
}

impl ExtractionContext {
    pub fn new(discovery_rank: usize, now: DateTime<Utc>) -> Self {
        Self {
            query: None,
            discovery_rank,
            now,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// Model-backed grant extractor.
pub struct Extractor<M> {
    model: M,
    preview_chars: usize,
    timeout: Duration,
}

impl<M: ModelClient> Extractor<M> {
    /// Create an extractor with a 12000-char preview and 60s timeout.
    pub fn new(model: M) -> Self {
        Self {
            model,
            preview_chars: 12_000,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Extract zero or more records from page content.
    ///
    /// A single page yields at most one record; a list page yields one per
    /// valid entry. Viability is not checked here.
    pub async fn extract(
        &self,
        content: &RawContent,
        ctx: &ExtractionContext,
    ) -> Result<Vec<GrantRecord>, ExtractionFailure> {
        let mode = ExtractionMode::for_content(content);
        let today = ctx.now.date_naive();
        let text = prompts::truncate_chars(&content.text, self.preview_chars);

        let request = ModelRequest {
            system: prompts::system_prompt(today),
            user: prompts::user_prompt(content, text, mode),
            schema: mode.schema(),
            url: content.url.clone(),
            today,
        };

        debug!(
            url = %content.url,
            model = self.model.name(),
            ?mode,
            chars = text.chars().count(),
            "extracting"
        );

        let answer = tokio::time::timeout(self.timeout, self.model.complete(&request))
            .await
            .map_err(|_| ExtractionFailure::Timeout(self.timeout))??;

        let grants = parse_answer(&answer, mode, &content.url)?;
        let records = grants
            .into_iter()
            .map(|grant| self.build_record(grant, content, ctx))
            .collect::<Vec<_>>();

        debug!(url = %content.url, records = records.len(), "extracted");
        Ok(records)
    }

    fn build_record(
        &self,
        grant: ModelGrant,
        content: &RawContent,
        ctx: &ExtractionContext,
    ) -> GrantRecord {
        let mut record = GrantRecord::new(&content.url, ctx.discovery_rank);
        record.source_strategy = Field::Value(content.strategy);
        record.extracted_at = ctx.now;

        let mut record = normalize::apply_model_grant(record, grant);
        if let Some(query) = &ctx.query {
            record.fit_score = Field::Value(relevance::fit_score(&record, query));
        }
        record
    }
}

/// Drop a Markdown code fence around a JSON answer.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model answer into grants.
///
/// Accepts an object, an array, or `{"grants": [...]}`. On list pages
/// invalid entries are skipped; on single pages only the first entry counts.
pub fn parse_answer(
    raw: &str,
    mode: ExtractionMode,
    url: &str,
) -> Result<Vec<ModelGrant>, ExtractionFailure> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| ExtractionFailure::Malformed(format!("not JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("grants") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ExtractionFailure::Malformed(
                    "`grants` is not an array".to_string(),
                ))
            }
            None => vec![Value::Object(map)],
        },
        other => {
            return Err(ExtractionFailure::Malformed(format!(
                "expected object or array, got {}",
                json_kind(&other)
            )))
        }
    };

    match mode {
        ExtractionMode::Single => match items.into_iter().next() {
            Some(item) => serde_json::from_value::<ModelGrant>(item)
                .map(|g| vec![g])
                .map_err(|e| ExtractionFailure::Malformed(e.to_string())),
            None => Ok(Vec::new()),
        },
        ExtractionMode::List => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value::<ModelGrant>(item) {
                Ok(grant) => Some(grant),
                Err(e) => {
                    warn!(url = %url, index, error = %e, "skipping invalid list entry");
                    None
                }
            })
            .collect()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
