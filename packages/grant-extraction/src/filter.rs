//! Viability gate and caller-side result refinement.
//!
//! [`ViabilityFilter`] is a data-quality gate: rejected records are dropped
//! by the orchestrator, never reported as errors. [`ResultFilters`] narrow an
//! already ranked result set to what a user asked for.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::extract::normalize::is_placeholder;
use crate::types::config::{OngoingDeadlinePolicy, PipelineConfig};
use crate::types::record::{Deadline, Demographic, Field, FundingType, GrantRecord, RejectReason, Viability};

/// Minimum-completeness rules for a record.
#[derive(Debug, Clone)]
pub struct ViabilityFilter {
    min_description_chars: usize,
    ongoing_policy: OngoingDeadlinePolicy,
}

impl Default for ViabilityFilter {
    fn default() -> Self {
        Self::new(50, OngoingDeadlinePolicy::Valid)
    }
}

impl ViabilityFilter {
    pub fn new(min_description_chars: usize, ongoing_policy: OngoingDeadlinePolicy) -> Self {
        Self {
            min_description_chars,
            ongoing_policy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.min_description_chars, config.ongoing_deadline_policy)
    }

    /// Evaluate a record.
    pub fn check(&self, record: &GrantRecord) -> Viability {
        if record.error.is_some() {
            return Viability::Rejected(RejectReason::ErrorMarker);
        }

        match record.title_text() {
            None => return Viability::Rejected(RejectReason::MissingTitle),
            Some(title) if is_placeholder(title) => {
                return Viability::Rejected(RejectReason::PlaceholderTitle)
            }
            Some(_) => {}
        }

        let populated = 1 + usize::from(self.has_deadline(record)) + usize::from(has_amount(record));
        if populated < 2 {
            return Viability::Rejected(RejectReason::TooFewCoreFields { populated });
        }

        let chars = match record.description.value() {
            Some(d) if !is_placeholder(d) => d.trim().chars().count(),
            _ => 0,
        };
        if chars < self.min_description_chars {
            return Viability::Rejected(RejectReason::ShortDescription {
                chars,
                min: self.min_description_chars,
            });
        }

        Viability::Viable
    }

    pub fn is_viable(&self, record: &GrantRecord) -> bool {
        self.check(record).is_viable()
    }

    /// Stamp the verdict onto the record.
    pub fn apply(&self, mut record: GrantRecord) -> GrantRecord {
        record.viability = self.check(&record);
        record
    }

    fn has_deadline(&self, record: &GrantRecord) -> bool {
        match record.deadline.value() {
            Some(Deadline::On(_)) => true,
            Some(Deadline::Unparsed(raw)) => !is_placeholder(raw),
            Some(Deadline::Ongoing) => self.ongoing_policy == OngoingDeadlinePolicy::Valid,
            None => false,
        }
    }
}

fn has_amount(record: &GrantRecord) -> bool {
    record.amount.value().is_some_and(|a| !is_placeholder(a))
}

/// Geography values that cover every region.
const NATIONAL_SCOPES: &[&str] = &["federal", "national", "canada-wide", "nationwide"];

/// Optional refinements applied after ranking. Empty filters pass everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultFilters {
    /// Keep records flagged with any of these demographics
    #[serde(default)]
    pub demographics: Vec<Demographic>,

    /// Keep records of any of these funding types
    #[serde(default)]
    pub funding_types: Vec<FundingType>,

    /// Keep records whose geography mentions this (national programs always pass)
    #[serde(default)]
    pub geography: Option<String>,

    /// Drop records whose deadline is before this date
    #[serde(default)]
    pub open_on: Option<NaiveDate>,
}

impl ResultFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demographics(mut self, demographics: Vec<Demographic>) -> Self {
        self.demographics = demographics;
        self
    }

    pub fn with_funding_types(mut self, types: Vec<FundingType>) -> Self {
        self.funding_types = types;
        self
    }

    pub fn with_geography(mut self, geography: impl Into<String>) -> Self {
        self.geography = Some(geography.into());
        self
    }

    /// Exclude deadlines that passed before `today`.
    pub fn excluding_expired(mut self, today: NaiveDate) -> Self {
        self.open_on = Some(today);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.demographics.is_empty()
            && self.funding_types.is_empty()
            && self.geography.is_none()
            && self.open_on.is_none()
    }

    pub fn matches(&self, record: &GrantRecord) -> bool {
        if !self.demographics.is_empty() {
            let flagged = match &record.demographics {
                Field::Value(flags) => flags.iter().any(|d| self.demographics.contains(d)),
                _ => false,
            };
            if !flagged {
                return false;
            }
        }

        if !self.funding_types.is_empty() {
            let typed = record
                .funding_type
                .value()
                .is_some_and(|t| self.funding_types.contains(t));
            if !typed {
                return false;
            }
        }

        if let Some(wanted) = &self.geography {
            let wanted = wanted.to_lowercase();
            let covered = record.geography.value().is_some_and(|g| {
                let g = g.to_lowercase();
                g.contains(&wanted) || NATIONAL_SCOPES.iter().any(|n| g.contains(n))
            });
            if !covered {
                return false;
            }
        }

        if let Some(today) = self.open_on {
            if record.deadline.value().is_some_and(|d| d.is_expired(today)) {
                return false;
            }
        }

        true
    }

    /// Keep matching records, preserving order.
    pub fn apply(&self, records: Vec<GrantRecord>) -> Vec<GrantRecord> {
        if self.is_empty() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}
