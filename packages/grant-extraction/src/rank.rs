//! Composite ranking of viable records.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::extract::relevance;
use crate::types::config::PipelineConfig;
use crate::types::record::{Deadline, Field, GrantRecord};

const FIT_WEIGHT: f64 = 0.4;
const FRESHNESS_WEIGHT: f64 = 0.2;
const COMPLETENESS_WEIGHT: f64 = 0.2;
const URGENCY_WEIGHT: f64 = 0.1;
const ACCESSIBILITY_WEIGHT: f64 = 0.1;

/// Score used for factors with no signal either way.
const NEUTRAL: f64 = 0.5;

/// Orders records by a weighted composite score.
#[derive(Debug, Clone)]
pub struct Ranker {
    cache_ttl: Duration,
    horizon_days: u32,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60), 180)
    }
}

impl Ranker {
    pub fn new(cache_ttl: Duration, horizon_days: u32) -> Self {
        Self {
            cache_ttl,
            horizon_days: horizon_days.max(1),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.cache_ttl, config.urgency_horizon_days)
    }

    /// Score and order records, best first.
    ///
    /// Ties fall back to completeness, then discovery rank, then input order.
    /// A missing fit score is filled in from `query` when one is given.
    pub fn rank(
        &self,
        records: Vec<GrantRecord>,
        query: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<GrantRecord> {
        let mut scored: Vec<(f64, f64, GrantRecord)> = records
            .into_iter()
            .map(|mut record| {
                if let (Field::Unspecified | Field::Omitted, Some(q)) = (&record.fit_score, query) {
                    record.fit_score = Field::Value(relevance::fit_score(&record, q));
                }
                let score = self.score(&record, now);
                record.rank_score = Field::Value(score);
                (score, record.completeness(), record)
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|(a_score, a_comp, a), (b_score, b_comp, b)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| b_comp.total_cmp(a_comp))
                .then_with(|| a.discovery_rank.cmp(&b.discovery_rank))
        });

        scored.into_iter().map(|(_, _, record)| record).collect()
    }

    /// Composite score, 0-100, rounded to two decimals.
    pub fn score(&self, record: &GrantRecord, now: DateTime<Utc>) -> f64 {
        let fit = match record.fit_score {
            Field::Value(score) => f64::from(score) / 100.0,
            _ => NEUTRAL,
        };
        let accessibility = match record.source_strategy {
            Field::Value(kind) => kind.accessibility_confidence(),
            _ => NEUTRAL,
        };

        let composite = FIT_WEIGHT * fit
            + FRESHNESS_WEIGHT * self.freshness(record.extracted_at, now)
            + COMPLETENESS_WEIGHT * record.completeness()
            + URGENCY_WEIGHT * self.urgency(&record.deadline, now)
            + ACCESSIBILITY_WEIGHT * accessibility;

        (composite * 100.0 * 100.0).round() / 100.0
    }

    fn freshness(&self, extracted_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let ttl = self.cache_ttl.as_secs_f64();
        if ttl <= 0.0 {
            return NEUTRAL;
        }
        let age = (now - extracted_at).num_milliseconds().max(0) as f64 / 1000.0;
        (1.0 - age / ttl).clamp(0.0, 1.0)
    }

    fn urgency(&self, deadline: &Field<Deadline>, now: DateTime<Utc>) -> f64 {
        let today = now.date_naive();
        match deadline.value().and_then(|d| d.days_until(today)) {
            Some(days) if days < 0 => 0.0,
            Some(days) => (1.0 - days as f64 / f64::from(self.horizon_days)).clamp(0.0, 1.0),
            None => NEUTRAL,
        }
    }
}

/// Compare two records by their stored rank score, best first.
pub fn by_rank_score(a: &GrantRecord, b: &GrantRecord) -> Ordering {
    let score = |r: &GrantRecord| r.rank_score.value().copied().unwrap_or(0.0);
    score(b).total_cmp(&score(a))
}
