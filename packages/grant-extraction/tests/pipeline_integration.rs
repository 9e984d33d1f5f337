//! Integration tests for the extraction orchestrator.
//!
//! These tests run whole batches through:
//! 1. Admission (dedupe, batch ceiling)
//! 2. Cache lookups
//! 3. The retrieval chain with retries
//! 4. Extraction and viability filtering
//! 5. Ranking

use std::sync::Arc;
use std::time::Duration;

use grant_extraction::{
    testing::{ConcurrencyProbe, MockModel, MockResponse, MockRetriever},
    Cache, CacheBackend, CacheKey, CandidateUrl, MemoryBackend, Orchestrator, PipelineConfig,
    PipelineError, RetrievalChain, StrategyKind, WorkState, SCHEMA_VERSION,
};
use tokio_util::sync::CancellationToken;

type TestOrchestrator = Orchestrator<Arc<MockModel>, MemoryBackend>;

/// Page text long enough to clear the content threshold.
fn page_text(title: &str) -> String {
    format!(
        "# {title}\n\nThis program supports community organizations with project funding. \
Eligible applicants include registered non-profits, charities and community groups. \
Funding covers equipment, staffing and program delivery costs for one year. \
Deadline: 2026-05-15."
    )
}

/// Page text that classifies as a listing of several grants.
fn listing_text() -> String {
    "# Funding opportunities\n\n\
- Youth Arts Grant. Deadline: 2026-04-30. Supports arts programs for youth.\n\
- Seniors Wellness Fund. Deadline: 2026-06-15. Supports wellness programs.\n\
- Placeholder listing. Deadline: TBD. Details to come.\n\n\
Browse all opportunities and check each closing date before applying to any program."
        .to_string()
}

fn grant_json(title: &str) -> String {
    format!(
        r#"{{"title": "{title}", "funder": "City Foundation", "deadline": "2026-05-15",
            "amount": "Up to $10,000", "funding_type": "Grant",
            "description": "Funding for community organizations delivering local programs for residents."}}"#
    )
}

struct Harness {
    orchestrator: TestOrchestrator,
    cache: Arc<Cache<MemoryBackend>>,
    model: Arc<MockModel>,
}

fn harness(config: PipelineConfig, strategies: Vec<Arc<MockRetriever>>, model: MockModel) -> Harness {
    let cache = Arc::new(Cache::new(MemoryBackend::new()));
    let model = Arc::new(model);
    let chain = strategies
        .into_iter()
        .fold(RetrievalChain::new(), |chain, s| chain.with_strategy(s));
    let orchestrator = Orchestrator::new(config, chain, model.clone(), cache.clone()).unwrap();
    Harness {
        orchestrator,
        cache,
        model,
    }
}

async fn is_cached(cache: &Cache<MemoryBackend>, key: &CacheKey) -> bool {
    cache.backend().load(key.as_str()).await.unwrap().is_some()
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_batch() {
    let ok = ["https://a.org/garden", "https://b.org/arts", "https://c.org/youth"];
    let hung = "https://slow.org/grant";
    let listing = "https://d.org/funding";

    let mut hosted = MockRetriever::new(StrategyKind::HostedExtract)
        .with_response(hung, MockResponse::Hang)
        .with_response(listing, MockResponse::Text(listing_text()));
    let mut fetch = MockRetriever::new(StrategyKind::PageFetch).with_response(hung, MockResponse::Hang);
    let mut model = MockModel::new().with_answer(
        listing,
        format!(
            r#"{{"grants": [{}, {{"title": "Untitled Grant", "deadline": "TBD"}}]}}"#,
            grant_json("Youth Arts Grant")
        ),
    );
    for (i, url) in ok.iter().enumerate() {
        let title = format!("Community Grant {i}");
        hosted = hosted.with_response(*url, MockResponse::Text(page_text(&title)));
        fetch = fetch.with_response(*url, MockResponse::Status(500));
        model = model.with_answer(*url, grant_json(&title));
    }

    let hosted = Arc::new(hosted);
    let fetch = Arc::new(fetch);
    let h = harness(
        PipelineConfig::default(),
        vec![hosted.clone(), fetch.clone()],
        model,
    );

    let candidates = CandidateUrl::ranked([ok[0], hung, ok[1], listing, ok[2]]);
    let report = h.orchestrator.run(candidates, Some("community grant")).await;

    assert_eq!(report.records.len(), 4);
    assert!(report
        .records
        .iter()
        .all(|r| r.title_text().is_some_and(|t| t != "Untitled Grant")));
    assert!(report.records.iter().all(|r| r.source_url != hung));
    assert!(report.records.iter().all(|r| r.viability.is_viable()));
    assert!(report.records.iter().all(|r| r.rank_score.is_populated()));

    let failed: Vec<_> = report.failed().map(|i| i.url.as_str()).collect();
    assert_eq!(failed, vec![hung]);
    assert_eq!(report.rejected(), 1);

    // Hosted extraction succeeded for every other URL, so page fetch only ran for the hung one
    assert_eq!(fetch.call_count(), hosted.calls_for(hung));
    assert_eq!(hosted.calls_for(hung), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let probe = ConcurrencyProbe::new();
    let urls: Vec<String> = (0..10).map(|i| format!("https://grants{i}.org/program")).collect();

    let mut retriever = MockRetriever::new(StrategyKind::PageFetch).with_probe(probe.clone());
    let mut model = MockModel::new()
        .with_delay(Duration::from_millis(500))
        .with_probe(probe.clone());
    for (i, url) in urls.iter().enumerate() {
        let title = format!("Program {i}");
        retriever = retriever.with_response(
            url.as_str(),
            MockResponse::Delayed(Duration::from_secs(2), page_text(&title)),
        );
        model = model.with_answer(url.as_str(), grant_json(&title));
    }

    let h = harness(
        PipelineConfig::default()
            .with_concurrency(3)
            .with_max_batch_size(10),
        vec![Arc::new(retriever)],
        model,
    );

    let report = h.orchestrator.run(CandidateUrl::ranked(urls), None).await;

    assert_eq!(report.records.len(), 10);
    assert!(probe.peak() <= 3, "peak in-flight was {}", probe.peak());
    assert_eq!(probe.peak(), 3);
    assert_eq!(probe.current(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_url_does_not_sink_batch() {
    let good = ["https://a.org/1", "https://b.org/2"];
    let bad = "https://broken.org/grant";

    let mut retriever = MockRetriever::new(StrategyKind::PageFetch).with_response(bad, MockResponse::Status(503));
    let mut model = MockModel::new();
    for url in good {
        retriever = retriever.with_response(url, MockResponse::Text(page_text(url)));
        model = model.with_answer(url, grant_json("Neighbourhood Grant"));
    }
    let retriever = Arc::new(retriever);
    let h = harness(PipelineConfig::default(), vec![retriever.clone()], model);

    let report = h
        .orchestrator
        .run(CandidateUrl::ranked([good[0], bad, good[1]]), None)
        .await;

    assert_eq!(report.records.len(), 2);
    assert!(report.records.iter().all(|r| r.source_url != bad));

    let bad_item = report.items.iter().find(|i| i.url == bad).unwrap();
    assert_eq!(bad_item.state, WorkState::Failed);
    // one retry of the whole chain
    assert_eq!(bad_item.attempts, 2);
    assert_eq!(retriever.calls_for(bad), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_never_cached() {
    let unreachable = "https://down.org/grant";
    let malformed = "https://garbled.org/grant";
    let rejected = "https://thin.org/grant";

    let retriever = MockRetriever::new(StrategyKind::PageFetch)
        .with_response(unreachable, MockResponse::Transport("connection reset".into()))
        .with_response(malformed, MockResponse::Text(page_text("Garbled")))
        .with_response(rejected, MockResponse::Text(page_text("Thin")));
    let model = MockModel::new()
        .with_answer(malformed, "I could not find a grant on this page.")
        .with_answer(rejected, r#"{"title": "Thin Grant", "description": "Short."}"#);
    let h = harness(PipelineConfig::default(), vec![Arc::new(retriever)], model);

    let report = h
        .orchestrator
        .run(CandidateUrl::ranked([unreachable, malformed, rejected]), None)
        .await;
    assert!(report.records.is_empty());

    for url in [unreachable, malformed, rejected] {
        let key = CacheKey::extraction(url, SCHEMA_VERSION);
        assert!(!is_cached(&h.cache, &key).await, "records cached for {url}");
    }
    assert!(!is_cached(&h.cache, &CacheKey::retrieval(unreachable)).await);
    // retrieval itself succeeded for these
    assert!(is_cached(&h.cache, &CacheKey::retrieval(malformed)).await);
    assert!(is_cached(&h.cache, &CacheKey::retrieval(rejected)).await);
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let url = "https://a.org/garden";
    let retriever = Arc::new(
        MockRetriever::new(StrategyKind::PageFetch)
            .with_response(url, MockResponse::Text(page_text("Garden Grant"))),
    );
    let model = MockModel::new().with_answer(url, grant_json("Garden Grant"));
    let h = harness(PipelineConfig::default(), vec![retriever.clone()], model);

    let first = h.orchestrator.run(CandidateUrl::ranked([url]), None).await;
    let second = h.orchestrator.run(CandidateUrl::ranked([url]), None).await;

    assert_eq!(first.records.len(), 1);
    assert_eq!(second.records.len(), 1);
    assert_eq!(first.records[0].title, second.records[0].title);
    assert!(!first.items[0].cache_hit);
    assert!(second.items[0].cache_hit);
    assert_eq!(retriever.call_count(), 1);
    assert_eq!(h.model.call_count(), 1);
}

#[tokio::test]
async fn test_duplicates_processed_once() {
    let retriever = Arc::new(
        MockRetriever::new(StrategyKind::PageFetch)
            .with_response("https://a.org/grant", MockResponse::Text(page_text("A")))
            .with_response("https://b.org/grant", MockResponse::Text(page_text("B"))),
    );
    let model = MockModel::new()
        .with_answer("https://a.org/grant", grant_json("Grant A"))
        .with_answer("https://b.org/grant", grant_json("Grant B"));
    let h = harness(PipelineConfig::default(), vec![retriever.clone()], model);

    let report = h
        .orchestrator
        .run(
            CandidateUrl::ranked([
                "https://a.org/grant",
                "https://a.org/grant#eligibility",
                "https://b.org/grant",
            ]),
            None,
        )
        .await;

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.duplicates, vec!["https://a.org/grant#eligibility"]);
    assert_eq!(retriever.call_count(), 2);
}

#[tokio::test]
async fn test_batch_ceiling_abandons_overflow() {
    let urls: Vec<String> = (1..=7).map(|i| format!("https://g{i}.org/")).collect();
    let mut retriever = MockRetriever::new(StrategyKind::PageFetch);
    let mut model = MockModel::new();
    for url in &urls {
        retriever = retriever.with_response(url.as_str(), MockResponse::Text(page_text(url)));
        model = model.with_answer(url.as_str(), grant_json("Overflow Grant"));
    }
    let retriever = Arc::new(retriever);
    let h = harness(PipelineConfig::default(), vec![retriever.clone()], model);

    let report = h.orchestrator.run(CandidateUrl::ranked(urls), None).await;

    assert_eq!(report.items.len(), 5);
    assert_eq!(report.abandoned, vec!["https://g6.org/", "https://g7.org/"]);
    assert_eq!(retriever.calls_for("https://g6.org/"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_discards_batch() {
    let url = "https://slow.org/grant";
    let retriever = MockRetriever::new(StrategyKind::PageFetch)
        .with_response(url, MockResponse::Delayed(Duration::from_secs(30), page_text("Slow")));
    let h = harness(
        PipelineConfig::default().with_strategy_timeout(Duration::from_secs(60)),
        vec![Arc::new(retriever)],
        MockModel::new().with_answer(url, grant_json("Slow Grant")),
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });

    let result = h
        .orchestrator
        .run_until_cancelled(CandidateUrl::ranked([url]), None, token)
        .await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(!is_cached(&h.cache, &CacheKey::retrieval(url)).await);

    // The abandoned item still runs its strategy to completion.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(is_cached(&h.cache, &CacheKey::retrieval(url)).await);
}
