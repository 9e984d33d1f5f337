//! Normalization of loosely typed model output into [`GrantRecord`] fields.
//!
//! Free text maps to the canonical vocabulary through fixed tables. Unmapped
//! values land in the `Other` variant rather than failing.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use super::prompts::{LooseValue, ModelGrant};
use crate::types::record::{Deadline, Demographic, Field, FundingType, GrantRecord};

/// Phrases models use for "no value".
const PLACEHOLDERS: &[&str] = &[
    "",
    "-",
    "n/a",
    "na",
    "none",
    "null",
    "unknown",
    "not specified",
    "unspecified",
    "not available",
    "not provided",
    "not found",
    "tbd",
    "see website",
    "untitled",
    "untitled grant",
    "no title",
    "no description available",
    "no description",
];

const FUNDING_TYPES: &[(&str, FundingType)] = &[
    ("grant", FundingType::Grant),
    ("grants", FundingType::Grant),
    ("non-repayable contribution", FundingType::Grant),
    ("non-repayable grant", FundingType::Grant),
    ("contribution", FundingType::Grant),
    ("loan", FundingType::Loan),
    ("loans", FundingType::Loan),
    ("interest-free loan", FundingType::Loan),
    ("low-interest loan", FundingType::Loan),
    ("microloan", FundingType::Loan),
    ("repayable contribution", FundingType::Loan),
    ("tax credit", FundingType::TaxCredit),
    ("tax credits", FundingType::TaxCredit),
    ("tax incentive", FundingType::TaxCredit),
    ("refundable tax credit", FundingType::TaxCredit),
    ("wage subsidy", FundingType::WageSubsidy),
    ("wage subsidies", FundingType::WageSubsidy),
    ("hiring subsidy", FundingType::WageSubsidy),
    ("scholarship", FundingType::Scholarship),
    ("scholarships", FundingType::Scholarship),
    ("bursary", FundingType::Scholarship),
    ("fellowship", FundingType::Fellowship),
    ("fellowships", FundingType::Fellowship),
    ("residency", FundingType::Fellowship),
    ("award", FundingType::Award),
    ("awards", FundingType::Award),
    ("prize", FundingType::Award),
];

const DEMOGRAPHICS: &[(&str, Demographic)] = &[
    ("women", Demographic::Women),
    ("woman", Demographic::Women),
    ("female", Demographic::Women),
    ("female founders", Demographic::Women),
    ("women entrepreneurs", Demographic::Women),
    ("women-owned", Demographic::Women),
    ("youth", Demographic::Youth),
    ("young entrepreneurs", Demographic::Youth),
    ("young people", Demographic::Youth),
    ("students", Demographic::Youth),
    ("student", Demographic::Youth),
    ("indigenous", Demographic::Indigenous),
    ("first nations", Demographic::Indigenous),
    ("inuit", Demographic::Indigenous),
    ("métis", Demographic::Indigenous),
    ("metis", Demographic::Indigenous),
    ("aboriginal", Demographic::Indigenous),
    ("aboriginal peoples", Demographic::Indigenous),
    ("veterans", Demographic::Veterans),
    ("veteran", Demographic::Veterans),
    ("newcomers", Demographic::Newcomers),
    ("immigrants", Demographic::Newcomers),
    ("refugees", Demographic::Newcomers),
    ("people with disabilities", Demographic::Disability),
    ("persons with disabilities", Demographic::Disability),
    ("disability", Demographic::Disability),
];

/// Demographic answers that mean "no particular focus".
const NO_DEMOGRAPHIC: &[&str] = &["general", "all", "everyone", "any"];

const ONGOING_PHRASES: &[&str] = &[
    "rolling",
    "ongoing",
    "continuous",
    "open until filled",
    "year-round",
    "year round",
    "no deadline",
    "any time",
    "anytime",
];

/// Date formats tried in order. Day-first for numeric dates.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Collapse whitespace and lowercase for table lookups.
fn lookup_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn is_placeholder(raw: &str) -> bool {
    let key = lookup_key(raw);
    let key = key.trim_matches(|c: char| c == '.' || c == '"' || c == '\'');
    PLACEHOLDERS.contains(&key)
}

pub fn normalize_funding_type(raw: &str) -> Field<FundingType> {
    if is_placeholder(raw) {
        return Field::Unspecified;
    }
    let key = lookup_key(raw);
    let mapped = FUNDING_TYPES
        .iter()
        .find(|(label, _)| *label == key)
        .map(|(_, kind)| kind.clone())
        .unwrap_or_else(|| FundingType::Other(raw.trim().to_string()));
    Field::Value(mapped)
}

/// Map one demographic label. `None` for "no particular focus".
pub fn normalize_demographic(raw: &str) -> Option<Demographic> {
    if is_placeholder(raw) {
        return None;
    }
    let key = lookup_key(raw);
    if NO_DEMOGRAPHIC.contains(&key.as_str()) {
        return None;
    }
    Some(
        DEMOGRAPHICS
            .iter()
            .find(|(label, _)| *label == key)
            .map(|(_, d)| d.clone())
            .unwrap_or_else(|| Demographic::Other(raw.trim().to_string())),
    )
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("static regex"))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().trim_end_matches('.');
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
}

pub fn parse_deadline(raw: &str) -> Field<Deadline> {
    if is_placeholder(raw) {
        return Field::Unspecified;
    }

    let key = lookup_key(raw);
    if ONGOING_PHRASES.iter().any(|p| key.contains(p)) {
        return Field::Value(Deadline::Ongoing);
    }

    if let Some(date) = parse_date(raw) {
        return Field::Value(Deadline::On(date));
    }

    // "Expired (2025-01-31)", "2026-03-14 (Health); 2026-10-29 (HANA)"
    if let Some(date) = iso_date_pattern()
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
    {
        return Field::Value(Deadline::On(date));
    }

    Field::Value(Deadline::Unparsed(raw.trim().to_string()))
}

fn text_of(value: LooseValue) -> Option<String> {
    match value {
        LooseValue::Text(s) => Some(s),
        LooseValue::List(items) => Some(items.join("; ")),
        LooseValue::Number(n) => Some(n.to_string()),
    }
}

fn items_of(value: LooseValue) -> Vec<String> {
    match value {
        LooseValue::Text(s) => s.split([',', ';']).map(str::to_string).collect(),
        LooseValue::List(items) => items,
        LooseValue::Number(n) => vec![n.to_string()],
    }
}

pub fn text_field(value: Option<LooseValue>) -> Field<String> {
    value
        .and_then(text_of)
        .map(|s| s.trim().to_string())
        .filter(|s| !is_placeholder(s))
        .into()
}

pub fn list_field(value: Option<LooseValue>) -> Field<Vec<String>> {
    let items: Vec<String> = value
        .map(items_of)
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !is_placeholder(s))
        .collect();
    if items.is_empty() {
        Field::Unspecified
    } else {
        Field::Value(items)
    }
}

fn demographics_field(value: Option<LooseValue>) -> Field<Vec<Demographic>> {
    let mut flags: Vec<Demographic> = Vec::new();
    for item in value.map(items_of).unwrap_or_default() {
        if let Some(flag) = normalize_demographic(&item) {
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        }
    }
    if flags.is_empty() {
        Field::Unspecified
    } else {
        Field::Value(flags)
    }
}

/// Fill a record's content fields from a model answer.
pub fn apply_model_grant(mut record: GrantRecord, grant: ModelGrant) -> GrantRecord {
    record.title = text_field(grant.title);
    record.funder = text_field(grant.funder);
    record.amount = text_field(grant.amount);
    record.deadline = grant
        .deadline
        .and_then(text_of)
        .map(|raw| parse_deadline(&raw))
        .unwrap_or(Field::Unspecified);
    record.focus_area = text_field(grant.focus_area);
    record.geography = text_field(grant.geography);
    record.funding_type = grant
        .funding_type
        .and_then(text_of)
        .map(|raw| normalize_funding_type(&raw))
        .unwrap_or(Field::Unspecified);
    record.eligibility = text_field(grant.eligibility);
    record.tags = list_field(grant.tags);
    record.demographics = demographics_field(grant.demographics);
    record.application_requirements = list_field(grant.application_requirements);
    record.description = text_field(grant.description);
    record.detailed_overview = text_field(grant.detailed_overview);
    record.error = grant.error.filter(|e| !e.trim().is_empty());
    record
}
