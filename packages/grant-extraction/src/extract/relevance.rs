//! Keyword fit between a record and the originating query.

use std::collections::BTreeSet;

use crate::types::record::GrantRecord;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "for", "of", "in", "to", "with", "on", "at", "by",
];

const TITLE_WEIGHT: u32 = 3;
const TAGS_WEIGHT: u32 = 2;
const DESCRIPTION_WEIGHT: u32 = 1;

/// Query keywords with stop-words removed.
pub fn keywords(query: &str) -> BTreeSet<String> {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Fit score, 0-100.
///
/// Coverage (share of keywords found anywhere) plus twice the weighted hit
/// count, capped at 100. An empty query scores 0.
pub fn fit_score(record: &GrantRecord, query: &str) -> u8 {
    let keywords = keywords(query);
    if keywords.is_empty() {
        return 0;
    }

    let title = record
        .title
        .value()
        .map(|t| t.to_lowercase())
        .unwrap_or_default();
    let description = [record.description.value(), record.detailed_overview.value()]
        .into_iter()
        .flatten()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let tags: Vec<String> = record
        .tags
        .value()
        .map(|tags| tags.iter().map(|t| t.to_lowercase()).collect())
        .unwrap_or_default();

    let mut weighted = 0u32;
    let mut matched = 0u32;
    for word in &keywords {
        let mut hit = false;
        if title.contains(word.as_str()) {
            weighted += TITLE_WEIGHT;
            hit = true;
        }
        if tags.iter().any(|t| t.contains(word.as_str())) {
            weighted += TAGS_WEIGHT;
            hit = true;
        }
        if description.contains(word.as_str()) {
            weighted += DESCRIPTION_WEIGHT;
            hit = true;
        }
        if hit {
            matched += 1;
        }
    }

    let coverage = f64::from(matched) / keywords.len() as f64 * 100.0;
    (coverage + f64::from(weighted) * 2.0).min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_removed() {
        let words = keywords("Grants for the Youth and Arts");
        assert_eq!(
            words.into_iter().collect::<Vec<_>>(),
            vec!["arts", "grants", "youth"]
        );
    }

    #[test]
    fn test_empty_query_scores_zero() {
        let record = GrantRecord::new("https://x.org", 1).with_title("Arts Grant");
        assert_eq!(fit_score(&record, ""), 0);
        assert_eq!(fit_score(&record, "the of and"), 0);
    }

    #[test]
    fn test_partial_match() {
        let record = GrantRecord::new("https://x.org", 1)
            .with_title("Community Garden Grant")
            .with_description("Supports urban gardens.");
        // "garden": title 3 + description 1; "robotics": miss
        // coverage 50 + 4 * 2 = 58
        assert_eq!(fit_score(&record, "garden robotics"), 58);
    }

    #[test]
    fn test_capped_at_100() {
        let record = GrantRecord::new("https://x.org", 1)
            .with_title("Youth arts garden grant")
            .with_tags(vec!["youth".into(), "arts".into(), "garden".into()])
            .with_description("Youth arts garden grant for everyone.");
        assert_eq!(fit_score(&record, "youth arts garden grant"), 100);
    }

    #[test]
    fn test_no_match_scores_zero() {
        let record = GrantRecord::new("https://x.org", 1).with_title("Farm Loan");
        assert_eq!(fit_score(&record, "robotics"), 0);
    }
}
