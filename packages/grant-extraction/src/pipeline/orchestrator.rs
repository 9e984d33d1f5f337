//! Bounded-concurrency extraction orchestrator.
//!
//! A single coordinating task admits work items, in discovery order, into a
//! pool bounded by a semaphore. Each item owns its content and records until
//! it hands its outcome back through the `JoinSet`, which is the only
//! aggregation point. Ranking runs once every item has finished.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::{Cache, CacheBackend, CacheKey};
use crate::error::{ConfigError, PipelineError};
use crate::extract::{relevance, ExtractionContext, Extractor};
use crate::filter::ViabilityFilter;
use crate::model::ModelClient;
use crate::rank::Ranker;
use crate::retrieval::RetrievalChain;
use crate::types::candidate::CandidateUrl;
use crate::types::config::PipelineConfig;
use crate::types::content::RawContent;
use crate::types::record::{Field, GrantRecord, SCHEMA_VERSION};

use super::retry::RetryPolicy;
use super::work_item::{FailureReason, ItemReport, WorkItem, WorkState};

/// Outcome of one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,

    /// Viable records, best first
    pub records: Vec<GrantRecord>,

    /// One report per processed candidate, in discovery order
    pub items: Vec<ItemReport>,

    /// Candidates dropped as duplicates of a better-ranked URL
    pub duplicates: Vec<String>,

    /// Candidates past the batch ceiling, never processed
    pub abandoned: Vec<String>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.state == WorkState::Failed)
    }

    pub fn cache_hits(&self) -> usize {
        self.items.iter().filter(|i| i.cache_hit).count()
    }

    pub fn rejected(&self) -> usize {
        self.items.iter().map(|i| i.rejected).sum()
    }
}

/// A batch after de-duplication and truncation.
struct Admission {
    items: Vec<WorkItem>,
    invalid: Vec<ItemReport>,
    duplicates: Vec<String>,
    abandoned: Vec<String>,
}

/// Per-item processing, shared by every spawned task.
struct Worker<M, B> {
    chain: RetrievalChain,
    extractor: Extractor<M>,
    filter: ViabilityFilter,
    cache: Arc<Cache<B>>,
    retry: RetryPolicy,
    config: PipelineConfig,
}

/// Runs candidate URLs through cache, retrieval, extraction, filtering and
/// ranking.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::new(config, chain, model, cache)?;
/// let report = orchestrator
///     .run(CandidateUrl::ranked(urls), Some("community garden grants"))
///     .await;
/// for record in &report.records {
///     println!("{:?}", record.title);
/// }
/// ```
pub struct Orchestrator<M, B> {
    worker: Arc<Worker<M, B>>,
    ranker: Ranker,
}

impl<M, B> Orchestrator<M, B>
where
    M: ModelClient + 'static,
    B: CacheBackend + 'static,
{
    /// Build an orchestrator. Fails on an invalid config or an empty chain.
    ///
    /// The config's content threshold and timeouts override whatever the
    /// chain was built with.
    pub fn new(
        config: PipelineConfig,
        chain: RetrievalChain,
        model: M,
        cache: Arc<Cache<B>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if chain.is_empty() {
            return Err(ConfigError::Invalid {
                field: "retrieval_chain",
                reason: "needs at least one strategy".to_string(),
            });
        }

        let chain = chain
            .with_min_content_chars(config.min_content_chars)
            .with_default_timeout(config.strategy_timeout);
        let extractor = Extractor::new(model)
            .with_preview_chars(config.content_preview_chars)
            .with_timeout(config.extraction_timeout);

        info!(
            concurrency = config.concurrency,
            max_batch_size = config.max_batch_size,
            strategies = ?chain.kinds(),
            cache = cache.backend().name(),
            "orchestrator ready"
        );

        Ok(Self {
            ranker: Ranker::from_config(&config),
            worker: Arc::new(Worker {
                chain,
                extractor,
                filter: ViabilityFilter::from_config(&config),
                cache,
                retry: RetryPolicy::from_config(&config),
                config,
            }),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.worker.config
    }

    /// Process a batch to completion.
    ///
    /// Never fails: items that cannot be retrieved or extracted are reported
    /// and left out of the records.
    pub async fn run(&self, candidates: Vec<CandidateUrl>, query: Option<&str>) -> BatchReport {
        let token = CancellationToken::new();
        self.run_until_cancelled(candidates, query, token)
            .await
            .unwrap_or_default()
    }

    /// Process a batch unless `cancel` fires first.
    ///
    /// On cancellation in-flight items are abandoned, left to finish their
    /// current work with results discarded, and nothing is
    /// returned. Cache entries already written stay valid.
    pub async fn run_until_cancelled(
        &self,
        candidates: Vec<CandidateUrl>,
        query: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, PipelineError> {
        let batch_id = Uuid::now_v7();
        let span = info_span!("batch", batch_id = %batch_id);
        self.execute(batch_id, candidates, query, cancel)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        batch_id: Uuid,
        candidates: Vec<CandidateUrl>,
        query: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<BatchReport, PipelineError> {
        let submitted = candidates.len();
        let Admission {
            items,
            invalid,
            duplicates,
            abandoned,
        } = self.admit(candidates);

        info!(
            submitted,
            admitted = items.len(),
            invalid = invalid.len(),
            duplicates = duplicates.len(),
            abandoned = abandoned.len(),
            "batch started"
        );

        let query: Option<Arc<str>> = query.map(Arc::from);
        let semaphore = Arc::new(Semaphore::new(self.worker.config.concurrency));
        let mut tasks = JoinSet::new();

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.detach_all();
                    warn!("batch cancelled during admission");
                    return Err(PipelineError::Cancelled);
                }
                permit = semaphore.clone().acquire_owned() => permit,
            };
            let Ok(permit) = permit else {
                break;
            };

            let worker = self.worker.clone();
            let query = query.clone();
            let span = info_span!("work_item", url = %item.url(), rank = item.candidate.discovery_rank);
            tasks.spawn(
                async move {
                    let outcome = worker.process(item, query).await;
                    drop(permit);
                    outcome
                }
                .instrument(span),
            );
        }

        let mut reports = invalid;
        let mut records = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(pending = tasks.len(), "batch cancelled, abandoning in-flight items");
                    tasks.detach_all();
                    return Err(PipelineError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((report, mut produced))) => {
                        records.append(&mut produced);
                        reports.push(report);
                    }
                    Some(Err(e)) => error!(error = %e, "work item task failed"),
                    None => break,
                },
            }
        }

        reports.sort_by_key(|r| r.discovery_rank);
        let now = self.worker.cache.now();
        let records = self.ranker.rank(records, query.as_deref(), now);

        let report = BatchReport {
            batch_id,
            records,
            items: reports,
            duplicates,
            abandoned,
        };
        info!(
            records = report.records.len(),
            failed = report.failed().count(),
            cache_hits = report.cache_hits(),
            rejected = report.rejected(),
            "batch complete"
        );
        Ok(report)
    }

    /// Sort by discovery rank, drop invalid and duplicate URLs, then apply
    /// the batch ceiling.
    fn admit(&self, mut candidates: Vec<CandidateUrl>) -> Admission {
        candidates.sort_by_key(|c| c.discovery_rank);

        let mut invalid = Vec::new();
        let mut duplicates = Vec::new();
        let mut unique: IndexMap<String, CandidateUrl> = IndexMap::new();

        for (index, candidate) in candidates.into_iter().enumerate() {
            if candidate.parsed().is_none() {
                warn!(url = %candidate.url, "skipping invalid candidate URL");
                let reason = FailureReason::InvalidUrl(candidate.url.clone());
                invalid.push(WorkItem::new(candidate).fail(reason));
                continue;
            }

            let key = if self.worker.config.dedupe_urls {
                candidate.dedupe_key()
            } else {
                format!("{index}\0{}", candidate.url)
            };
            if unique.contains_key(&key) {
                debug!(url = %candidate.url, "dropping duplicate candidate");
                duplicates.push(candidate.url);
            } else {
                unique.insert(key, candidate);
            }
        }

        let mut items: Vec<WorkItem> = unique.into_values().map(WorkItem::new).collect();
        let ceiling = self.worker.config.max_batch_size;
        let abandoned = if items.len() > ceiling {
            items
                .split_off(ceiling)
                .into_iter()
                .map(|item| item.candidate.url)
                .collect()
        } else {
            Vec::new()
        };

        Admission {
            items,
            invalid,
            duplicates,
            abandoned,
        }
    }
}

impl<M: ModelClient, B: CacheBackend> Worker<M, B> {
    /// Drive one item to a terminal state.
    async fn process(
        &self,
        mut item: WorkItem,
        query: Option<Arc<str>>,
    ) -> (ItemReport, Vec<GrantRecord>) {
        item.advance(WorkState::CacheCheck);
        let records_key = CacheKey::extraction(item.url(), SCHEMA_VERSION);

        if let Some(cached) = self.cache.get::<Vec<GrantRecord>>(&records_key).await {
            item.mark_cache_hit();
            // Cached under an earlier config; re-check against the current one.
            let (records, rejected): (Vec<_>, Vec<_>) = cached
                .into_iter()
                .map(|record| self.filter.apply(refit(record, query.as_deref())))
                .partition(|record| record.viability.is_viable());
            let (count, dropped) = (records.len(), rejected.len());
            debug!(records = count, rejected = dropped, "served from extraction cache");
            return (item.finish(count, dropped), records);
        }

        item.advance(WorkState::Retrieving);
        let content = match self.retrieve(&mut item).await {
            Ok(content) => content,
            Err(reason) => {
                warn!(url = %item.url(), reason = %reason, "work item failed");
                return (item.fail(reason), Vec::new());
            }
        };
        item.set_strategy(content.strategy);

        item.advance(WorkState::Extracting);
        let mut ctx = ExtractionContext::new(item.candidate.discovery_rank, self.cache.now());
        if let Some(q) = query.as_deref() {
            ctx = ctx.with_query(q);
        }
        let extracted = match self.extractor.extract(&content, &ctx).await {
            Ok(records) => records,
            Err(e) => {
                warn!(url = %item.url(), strategy = %content.strategy, error = %e, "extraction failed");
                return (item.fail(FailureReason::Extraction(e.to_string())), Vec::new());
            }
        };
        drop(content);

        item.advance(WorkState::Filtering);
        let (viable, rejected): (Vec<_>, Vec<_>) = extracted
            .into_iter()
            .map(|record| self.filter.apply(record))
            .partition(|record| record.viability.is_viable());

        for record in &rejected {
            debug!(
                title = ?record.title_text(),
                verdict = ?record.viability,
                "record rejected"
            );
        }

        if !viable.is_empty() {
            if let Err(e) = self
                .cache
                .put(&records_key, &viable, self.config.cache_ttl)
                .await
            {
                warn!(error = %e, "failed to cache extracted records");
            }
        }

        let (count, dropped) = (viable.len(), rejected.len());
        debug!(records = count, rejected = dropped, "work item done");
        (item.finish(count, dropped), viable)
    }

    /// Content from the retrieval cache, or the chain with retries.
    async fn retrieve(&self, item: &mut WorkItem) -> Result<RawContent, FailureReason> {
        let key = CacheKey::retrieval(item.url());
        if let Some(content) = self.cache.get::<RawContent>(&key).await {
            item.mark_content_cached();
            return Ok(content);
        }

        let chain = &self.chain;
        let url = item.url().to_string();
        let target = url.as_str();
        let (result, attempts) = self
            .retry
            .run(target, move |_| chain.retrieve(target))
            .await;
        item.set_attempts(attempts);

        let content = result.map_err(|failure| {
            let cause = failure
                .last_cause()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no eligible strategy".to_string());
            FailureReason::Retrieval(cause)
        })?;

        if let Err(e) = self.cache.put(&key, &content, self.config.cache_ttl).await {
            warn!(error = %e, "failed to cache retrieved content");
        }
        Ok(content)
    }
}

/// Recompute the fit score of a cached record for the current query.
fn refit(mut record: GrantRecord, query: Option<&str>) -> GrantRecord {
    record.fit_score = match query {
        Some(q) => Field::Value(relevance::fit_score(&record, q)),
        None => Field::Unspecified,
    };
    record.rank_score = Field::Unspecified;
    record
}
