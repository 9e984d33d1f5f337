//! Per-URL unit of work and its state machine.
//!
//! ```text
//! Pending -> CacheCheck -> CacheHit -> Done
//!                       \-> Retrieving -> Extracting -> Filtering -> Done
//!                                     \-> Failed     \-> Failed
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::candidate::CandidateUrl;
use crate::types::content::StrategyKind;

/// Where a work item is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    Pending,
    CacheCheck,
    CacheHit,
    Retrieving,
    Extracting,
    Filtering,
    Done,
    Failed,
}

impl WorkState {
    /// Whether the item holds a concurrency permit in this state.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Retrieving | Self::Extracting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` is a legal successor.
    pub fn can_advance_to(self, next: WorkState) -> bool {
        use WorkState::*;
        matches!(
            (self, next),
            (Pending, CacheCheck)
                | (Pending, Failed)
                | (CacheCheck, CacheHit)
                | (CacheCheck, Retrieving)
                | (CacheHit, Done)
                | (Retrieving, Extracting)
                | (Retrieving, Failed)
                | (Extracting, Filtering)
                | (Extracting, Failed)
                | (Filtering, Done)
        )
    }
}

/// Why a work item ended in [`WorkState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "cause", rename_all = "snake_case")]
pub enum FailureReason {
    /// Not an http(s) URL
    InvalidUrl(String),
    /// Every retrieval strategy failed, after retries
    Retrieval(String),
    /// The model call failed or its answer was unusable
    Extraction(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl(cause) => write!(f, "invalid URL: {cause}"),
            Self::Retrieval(cause) => write!(f, "retrieval failed: {cause}"),
            Self::Extraction(cause) => write!(f, "extraction failed: {cause}"),
        }
    }
}

/// What happened to one candidate URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub url: String,
    pub discovery_rank: usize,
    pub state: WorkState,

    /// Records came from the extraction cache
    pub cache_hit: bool,

    /// Content came from the retrieval cache
    pub content_cached: bool,

    /// Strategy that produced the content
    pub strategy: Option<StrategyKind>,

    /// Retrieval chain runs, including retries
    pub attempts: u32,

    /// Viable records produced
    pub records: usize,

    /// Records dropped by the viability filter
    pub rejected: usize,

    pub failure: Option<FailureReason>,
}

/// A candidate URL moving through the pipeline.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub candidate: CandidateUrl,
    report: ItemReport,
}

impl WorkItem {
    pub fn new(candidate: CandidateUrl) -> Self {
        let report = ItemReport {
            url: candidate.url.clone(),
            discovery_rank: candidate.discovery_rank,
            state: WorkState::Pending,
            cache_hit: false,
            content_cached: false,
            strategy: None,
            attempts: 0,
            records: 0,
            rejected: 0,
            failure: None,
        };
        Self { candidate, report }
    }

    pub fn url(&self) -> &str {
        &self.candidate.url
    }

    pub fn state(&self) -> WorkState {
        self.report.state
    }

    /// Move to the next state.
    pub fn advance(&mut self, next: WorkState) {
        debug_assert!(
            self.report.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.report.state,
            next
        );
        trace!(url = %self.candidate.url, from = ?self.report.state, to = ?next, "work item transition");
        self.report.state = next;
    }

    /// Move to [`WorkState::Failed`] and close the report.
    pub fn fail(mut self, reason: FailureReason) -> ItemReport {
        self.advance(WorkState::Failed);
        self.report.failure = Some(reason);
        self.report
    }

    /// Move to [`WorkState::Done`] and close the report.
    pub fn finish(mut self, records: usize, rejected: usize) -> ItemReport {
        self.advance(WorkState::Done);
        self.report.records = records;
        self.report.rejected = rejected;
        self.report
    }

    pub fn mark_cache_hit(&mut self) {
        self.report.cache_hit = true;
        self.advance(WorkState::CacheHit);
    }

    pub fn mark_content_cached(&mut self) {
        self.report.content_cached = true;
    }

    pub fn set_strategy(&mut self, strategy: StrategyKind) {
        self.report.strategy = Some(strategy);
    }

    pub fn set_attempts(&mut self, attempts: u32) {
        self.report.attempts = attempts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::new(CandidateUrl::new("https://example.org/grant", 2))
    }

    #[test]
    fn test_happy_path() {
        let mut item = item();
        for next in [WorkState::CacheCheck, WorkState::Retrieving, WorkState::Extracting] {
            item.advance(next);
        }
        assert!(item.state().is_in_flight());
        item.advance(WorkState::Filtering);

        let report = item.finish(2, 1);
        assert_eq!(report.state, WorkState::Done);
        assert_eq!(report.records, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.discovery_rank, 2);
    }

    #[test]
    fn test_cache_hit_path() {
        let mut item = item();
        item.advance(WorkState::CacheCheck);
        item.mark_cache_hit();
        let report = item.finish(1, 0);
        assert!(report.cache_hit);
        assert!(report.state.is_terminal());
    }

    #[test]
    fn test_failure_records_reason() {
        let mut item = item();
        item.advance(WorkState::CacheCheck);
        item.advance(WorkState::Retrieving);
        let report = item.fail(FailureReason::Retrieval("HTTP status 503".into()));
        assert_eq!(report.state, WorkState::Failed);
        assert_eq!(
            report.failure.map(|f| f.to_string()),
            Some("retrieval failed: HTTP status 503".to_string())
        );
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!WorkState::Pending.can_advance_to(WorkState::Extracting));
        assert!(!WorkState::Done.can_advance_to(WorkState::Retrieving));
        assert!(!WorkState::CacheHit.can_advance_to(WorkState::Retrieving));
    }
}
