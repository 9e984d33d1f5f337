//! Extraction prompts and the model output schema.

use chrono::NaiveDate;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::types::content::{looks_like_listing, ContentKind, RawContent};

/// Loosely typed model value: models return either a string or a list for
/// most fields.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LooseValue {
    Text(String),
    List(Vec<String>),
    Number(f64),
}

/// One grant as the model reports it, before normalization.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ModelGrant {
    /// The grant program name
    pub title: Option<LooseValue>,
    /// Organization or agency offering the funding
    pub funder: Option<LooseValue>,
    /// Funding amount, e.g. "Up to $50,000" or "$5,000 - $25,000"
    pub amount: Option<LooseValue>,
    /// Closing date as YYYY-MM-DD, "Rolling deadline", or "Expired (YYYY-MM-DD)"
    pub deadline: Option<LooseValue>,
    /// Main focus area, e.g. "Community arts"
    pub focus_area: Option<LooseValue>,
    /// Geographic scope, e.g. "Federal - Canada", "Ontario", "Toronto, Ontario"
    pub geography: Option<LooseValue>,
    /// One of "Grant", "Loan", "Tax Credit", "Wage Subsidy", "Scholarship", "Fellowship", "Award"
    #[serde(alias = "funding_nature")]
    pub funding_type: Option<LooseValue>,
    /// Who can apply
    pub eligibility: Option<LooseValue>,
    /// 3-5 category keywords
    pub tags: Option<LooseValue>,
    /// Demographic focus, e.g. ["Women", "Youth", "Indigenous"]
    #[serde(alias = "founder_demographics")]
    pub demographics: Option<LooseValue>,
    /// Documents or conditions needed to apply
    pub application_requirements: Option<LooseValue>,
    /// 1-2 sentence summary of what the grant funds
    pub description: Option<LooseValue>,
    /// Comprehensive description of the program, goals and purpose
    pub detailed_overview: Option<LooseValue>,
    /// Set only when the page holds no grant information at all
    pub error: Option<String>,
}

/// Answer shape for list pages.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ModelGrantList {
    pub grants: Vec<ModelGrant>,
}

/// Whether the extractor asks for one grant or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    Single,
    List,
}

impl ExtractionMode {
    pub fn for_kind(kind: ContentKind) -> Self {
        match kind {
            ContentKind::ListPage => Self::List,
            _ => Self::Single,
        }
    }

    /// Mode for retrieved content. Untagged pages and documents are checked
    /// for listing structure here, so a listing PDF still yields every grant.
    pub fn for_content(content: &RawContent) -> Self {
        match content.kind {
            ContentKind::ListPage => Self::List,
            ContentKind::Empty => Self::Single,
            ContentKind::HtmlPage | ContentKind::Document => {
                if looks_like_listing(&content.text) {
                    Self::List
                } else {
                    Self::Single
                }
            }
        }
    }

    /// JSON schema of the expected answer.
    pub fn schema(self) -> serde_json::Value {
        let schema = match self {
            Self::Single => schema_for!(ModelGrant),
            Self::List => schema_for!(ModelGrantList),
        };
        serde_json::to_value(schema).unwrap_or_default()
    }
}

/// System prompt anchored to the extraction date.
pub fn system_prompt(today: NaiveDate) -> String {
    let long = today.format("%B %d, %Y");
    let iso = today.format("%Y-%m-%d");
    format!(
        "You are an expert grant data extractor. You turn the text of a web page into \
structured grant data.

Today's date is {long} ({iso}). Interpret every date relative to today, not to when \
the page was published.

Deadline rules:
- Convert dates to YYYY-MM-DD.
- If intake is rolling, ongoing or continuous, use \"Rolling deadline\".
- If several cycles are listed, use the next one after {iso}.
- If the deadline is before {iso}, use \"Expired (YYYY-MM-DD)\".
- Relative phrases such as \"by June\" mean the next such date after {iso}.

Amount rules:
- Search the whole page for dollar amounts and ranges.
- \"up to $X\" becomes \"Up to $X\"; ranges become \"$X - $Y\".

If a field is truly absent, use null. Never invent values. Output valid JSON only."
    )
}

/// User message for one page.
pub fn user_prompt(content: &RawContent, text: &str, mode: ExtractionMode) -> String {
    let shape = match mode {
        ExtractionMode::Single => {
            "This page describes a single opportunity. Answer with ONE JSON object \
following the schema."
        }
        ExtractionMode::List => {
            "This page lists several opportunities. Answer with a JSON object \
{\"grants\": [...]} holding one entry per distinct opportunity, each following the \
grant schema."
        }
    };

    let title = content
        .title
        .as_deref()
        .map(|t| format!("Page title: {t}\n"))
        .unwrap_or_default();

    format!(
        "{shape}\n\nSource URL: {url}\n{title}\n--- PAGE CONTENT ---\n{text}\n--- END ---",
        url = content.url,
    )
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::content::StrategyKind;

    #[test]
    fn test_system_prompt_carries_date() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let prompt = system_prompt(today);
        assert!(prompt.contains("October 16, 2026"));
        assert!(prompt.contains("2026-10-16"));
        assert!(prompt.contains("Rolling deadline"));
        assert!(prompt.contains("Expired (YYYY-MM-DD)"));
    }

    #[test]
    fn test_list_prompt_requests_grants_array() {
        let content = RawContent::new("https://x.org", "text", StrategyKind::PageFetch)
            .with_title("Funding");
        let prompt = user_prompt(&content, "text", ExtractionMode::List);
        assert!(prompt.contains("{\"grants\": [...]}"));
        assert!(prompt.contains("Page title: Funding"));
    }

    #[test]
    fn test_schema_lists_fields() {
        let schema = ExtractionMode::Single.schema();
        let properties = &schema["properties"];
        assert!(properties.get("title").is_some());
        assert!(properties.get("deadline").is_some());
        assert!(ExtractionMode::List.schema()["properties"]
            .get("grants")
            .is_some());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_model_grant_accepts_aliases_and_loose_values() {
        let grant: ModelGrant = serde_json::from_str(
            r#"{"title": "Arts", "funding_nature": "Loan", "founder_demographics": ["Women"], "amount": 5000}"#,
        )
        .unwrap();
        assert_eq!(grant.funding_type, Some(LooseValue::Text("Loan".into())));
        assert_eq!(
            grant.demographics,
            Some(LooseValue::List(vec!["Women".into()]))
        );
        assert_eq!(grant.amount, Some(LooseValue::Number(5000.0)));
    }
}
