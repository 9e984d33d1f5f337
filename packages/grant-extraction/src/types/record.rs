//! Structured grant records.
//!
//! Every content field is a [`Field`], so "the extractor found nothing"
//! (`Unspecified`) stays distinguishable from "this schema version never
//! had the field" (`Omitted`).

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::content::StrategyKind;

/// Current shape of [`GrantRecord`]. Part of the extraction cache key.
pub const SCHEMA_VERSION: u32 = 2;

/// A record field with an explicit empty state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    /// The extractor produced a value
    Value(T),
    /// The extractor looked and found nothing usable
    Unspecified,
    /// The field is not part of the schema version that produced the record
    Omitted,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl<T> Field<T> {
    /// Used as the serde default so entries written before a field existed
    /// read back as `Omitted`.
    pub fn omitted() -> Self {
        Self::Omitted
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_populated(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Value(v) => Field::Value(f(v)),
            Self::Unspecified => Field::Unspecified,
            Self::Omitted => Field::Omitted,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Unspecified,
        }
    }
}

/// Normalized application deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Deadline {
    /// A calendar date (may already be in the past)
    On(NaiveDate),
    /// Rolling or open-ended intake
    Ongoing,
    /// Text that mentions a deadline but could not be parsed
    Unparsed(String),
}

impl Deadline {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Self::On(d) => Some(*d),
            _ => None,
        }
    }

    /// Days from `today` until the deadline. Negative when past.
    pub fn days_until(&self, today: NaiveDate) -> Option<i64> {
        self.date().map(|d| (d - today).num_days())
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.date().is_some_and(|d| d < today)
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Ongoing => f.write_str("Rolling deadline"),
            Self::Unparsed(raw) => f.write_str(raw),
        }
    }
}

/// Canonical funding vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingType {
    Grant,
    Loan,
    TaxCredit,
    WageSubsidy,
    Scholarship,
    Fellowship,
    Award,
    /// Funder text with no canonical mapping
    Other(String),
}

impl fmt::Display for FundingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Grant => "Grant",
            Self::Loan => "Loan",
            Self::TaxCredit => "Tax Credit",
            Self::WageSubsidy => "Wage Subsidy",
            Self::Scholarship => "Scholarship",
            Self::Fellowship => "Fellowship",
            Self::Award => "Award",
            Self::Other(raw) => raw,
        };
        f.write_str(label)
    }
}

/// Demographic focus flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Demographic {
    Women,
    Youth,
    Indigenous,
    Veterans,
    Newcomers,
    Disability,
    Other(String),
}

impl fmt::Display for Demographic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Women => "Women",
            Self::Youth => "Youth",
            Self::Indigenous => "Indigenous",
            Self::Veterans => "Veterans",
            Self::Newcomers => "Newcomers",
            Self::Disability => "Persons with disabilities",
            Self::Other(raw) => raw,
        };
        f.write_str(label)
    }
}

/// Why the viability gate rejected a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    ErrorMarker,
    MissingTitle,
    PlaceholderTitle,
    ShortDescription { chars: usize, min: usize },
    TooFewCoreFields { populated: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrorMarker => f.write_str("extractor error marker"),
            Self::MissingTitle => f.write_str("missing title"),
            Self::PlaceholderTitle => f.write_str("placeholder title"),
            Self::ShortDescription { chars, min } => {
                write!(f, "description too short ({chars} < {min})")
            }
            Self::TooFewCoreFields { populated } => {
                write!(f, "only {populated} of title/deadline/amount populated")
            }
        }
    }
}

/// Viability verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Viability {
    #[default]
    Unchecked,
    Viable,
    Rejected(RejectReason),
}

impl Viability {
    pub fn is_viable(&self) -> bool {
        matches!(self, Self::Viable)
    }
}

/// One structured grant opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    // Identity
    #[serde(default = "Field::omitted")]
    pub title: Field<String>,
    #[serde(default = "Field::omitted")]
    pub funder: Field<String>,

    /// Amount as free text ("Up to $50,000")
    #[serde(default = "Field::omitted")]
    pub amount: Field<String>,

    #[serde(default = "Field::omitted")]
    pub deadline: Field<Deadline>,

    // Categorical
    #[serde(default = "Field::omitted")]
    pub focus_area: Field<String>,
    #[serde(default = "Field::omitted")]
    pub geography: Field<String>,
    #[serde(default = "Field::omitted")]
    pub funding_type: Field<FundingType>,
    #[serde(default = "Field::omitted")]
    pub eligibility: Field<String>,
    #[serde(default = "Field::omitted")]
    pub tags: Field<Vec<String>>,
    #[serde(default = "Field::omitted")]
    pub demographics: Field<Vec<Demographic>>,
    #[serde(default = "Field::omitted")]
    pub application_requirements: Field<Vec<String>>,

    // Descriptive
    #[serde(default = "Field::omitted")]
    pub description: Field<String>,
    #[serde(default = "Field::omitted")]
    pub detailed_overview: Field<String>,

    // Provenance
    pub source_url: String,
    #[serde(default)]
    pub discovery_rank: usize,
    #[serde(default = "Field::omitted")]
    pub source_strategy: Field<StrategyKind>,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub schema_version: u32,

    // Derived
    /// Query fit, 0-100
    #[serde(default)]
    pub fit_score: Field<u8>,
    #[serde(default)]
    pub viability: Viability,
    /// Composite rank score, 0-100
    #[serde(default)]
    pub rank_score: Field<f64>,

    /// Set by the extractor when the record is known to be unusable
    #[serde(default)]
    pub error: Option<String>,
}

impl GrantRecord {
    /// An all-unspecified record for a source URL.
    pub fn new(source_url: impl Into<String>, discovery_rank: usize) -> Self {
        Self {
            title: Field::Unspecified,
            funder: Field::Unspecified,
            amount: Field::Unspecified,
            deadline: Field::Unspecified,
            focus_area: Field::Unspecified,
            geography: Field::Unspecified,
            funding_type: Field::Unspecified,
            eligibility: Field::Unspecified,
            tags: Field::Unspecified,
            demographics: Field::Unspecified,
            application_requirements: Field::Unspecified,
            description: Field::Unspecified,
            detailed_overview: Field::Unspecified,
            source_url: source_url.into(),
            discovery_rank,
            source_strategy: Field::Unspecified,
            extracted_at: Utc::now(),
            schema_version: SCHEMA_VERSION,
            fit_score: Field::Unspecified,
            viability: Viability::Unchecked,
            rank_score: Field::Unspecified,
            error: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Field::Value(title.into());
        self
    }

    pub fn with_funder(mut self, funder: impl Into<String>) -> Self {
        self.funder = Field::Value(funder.into());
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Field::Value(amount.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Field::Value(deadline);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Field::Value(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Field::Value(tags);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Title text, if populated.
    pub fn title_text(&self) -> Option<&str> {
        self.title.value().map(String::as_str)
    }

    /// Description length in characters (0 when unspecified).
    pub fn description_chars(&self) -> usize {
        self.description
            .value()
            .map(|d| d.trim().chars().count())
            .unwrap_or(0)
    }

    /// Fraction of content fields carrying a value (0.0-1.0).
    pub fn completeness(&self) -> f64 {
        let populated = [
            self.title.is_populated(),
            self.funder.is_populated(),
            self.amount.is_populated(),
            self.deadline.is_populated(),
            self.focus_area.is_populated(),
            self.geography.is_populated(),
            self.funding_type.is_populated(),
            self.eligibility.is_populated(),
            self.tags.is_populated(),
            self.demographics.is_populated(),
            self.application_requirements.is_populated(),
            self.description.is_populated(),
            self.detailed_overview.is_populated(),
        ];
        let count = populated.iter().filter(|p| **p).count();
        count as f64 / populated.len() as f64
    }
}
