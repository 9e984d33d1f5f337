//! Extraction pipeline - the concurrency core of the library.
//!
//! The pipeline orchestrates, per candidate URL:
//! - Extraction cache lookup (records from an earlier run)
//! - Retrieval cache lookup, then the retrieval chain with retries
//! - Model-backed extraction
//! - Viability filtering
//!
//! and, once every item is finished, ranking of the combined records.

pub mod orchestrator;
pub mod retry;
pub mod work_item;

pub use orchestrator::{BatchReport, Orchestrator};
pub use retry::RetryPolicy;
pub use work_item::{FailureReason, ItemReport, WorkItem, WorkState};
