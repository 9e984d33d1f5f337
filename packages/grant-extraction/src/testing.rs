//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the extraction library
//! without making real model or network calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::cache::Clock;
use crate::error::{ModelError, RetrievalError, RetrievalResult};
use crate::model::{ModelClient, ModelRequest};
use crate::retrieval::{ContentHint, Retriever};
use crate::types::content::{RawContent, StrategyKind};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at the Unix epoch.
    pub fn at_epoch() -> Self {
        Self::at(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap();
        *self.now.lock().unwrap() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Shared in-flight counter with a high-water mark.
///
/// Hand the same probe to several mocks to observe how many of their calls
/// overlap.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a call as in flight until the guard drops.
    pub fn enter(&self) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            current: self.current.clone(),
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the probe's in-flight count on drop.
#[derive(Debug)]
pub struct ProbeGuard {
    current: Arc<AtomicUsize>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted outcome of one mock retrieval.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Succeed with this text
    Text(String),
    /// Succeed with this text after a delay
    Delayed(Duration, String),
    /// Fail with an HTTP status
    Status(u16),
    /// Fail as if the connection dropped
    Transport(String),
    /// Report that the URL serves a document
    DocumentContent,
    /// Never answer
    Hang,
}

/// A mock retrieval strategy.
///
/// Each URL has a queue of responses; the last one repeats. Unscripted URLs
/// answer 404.
pub struct MockRetriever {
    kind: StrategyKind,
    only: Option<ContentHint>,
    responses: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    calls: Arc<RwLock<Vec<String>>>,
    probe: Option<ConcurrencyProbe>,
}

impl MockRetriever {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            only: None,
            responses: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            probe: None,
        }
    }

    /// Script a single response for a URL.
    pub fn with_response(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.with_responses(url, vec![response])
    }

    /// Script successive responses for a URL.
    pub fn with_responses(self, url: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(url.into(), responses.into());
        self
    }

    /// Accept only URLs hinted as documents.
    pub fn documents_only(mut self) -> Self {
        self.only = Some(ContentHint::Document);
        self
    }

    /// Accept only URLs hinted as pages.
    pub fn pages_only(mut self) -> Self {
        self.only = Some(ContentHint::Page);
        self
    }

    /// Track overlapping calls.
    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// URLs requested, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Calls made for one URL.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.read().unwrap().iter().filter(|u| *u == url).count()
    }

    fn next_response(&self, url: &str) -> MockResponse {
        let mut responses = self.responses.write().unwrap();
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(MockResponse::Status(404)),
            Some(queue) => queue.front().cloned().unwrap_or(MockResponse::Status(404)),
            None => MockResponse::Status(404),
        }
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(&self, url: &str) -> RetrievalResult<RawContent> {
        self.calls.write().unwrap().push(url.to_string());
        let _guard = self.probe.as_ref().map(ConcurrencyProbe::enter);

        match self.next_response(url) {
            MockResponse::Text(text) => Ok(RawContent::new(url, text, self.kind)),
            MockResponse::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(RawContent::new(url, text, self.kind))
            }
            MockResponse::Status(status) => Err(RetrievalError::Status { status }),
            MockResponse::Transport(message) => Err(RetrievalError::transport(
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, message),
            )),
            MockResponse::DocumentContent => Err(RetrievalError::DocumentContent {
                content_type: "application/pdf".to_string(),
            }),
            MockResponse::Hang => std::future::pending().await,
        }
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn accepts(&self, _url: &str, hint: ContentHint) -> bool {
        self.only.map_or(true, |only| only == hint)
    }
}

#[derive(Debug, Clone)]
enum MockAnswer {
    Json(String),
    Error { status: u16, body: String },
    Hang,
}

/// A mock model client.
///
/// Answers are scripted per source URL. Unscripted URLs fail with
/// [`ModelError::Empty`].
#[derive(Default)]
pub struct MockModel {
    answers: Arc<RwLock<HashMap<String, MockAnswer>>>,
    requests: Arc<RwLock<Vec<ModelRequest>>>,
    delay: Option<Duration>,
    probe: Option<ConcurrencyProbe>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for a URL with this raw text.
    pub fn with_answer(self, url: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answers
            .write()
            .unwrap()
            .insert(url.into(), MockAnswer::Json(answer.into()));
        self
    }

    /// Fail requests for a URL with an API error.
    pub fn with_error(self, url: impl Into<String>, status: u16) -> Self {
        self.answers.write().unwrap().insert(
            url.into(),
            MockAnswer::Error {
                status,
                body: "mock failure".to_string(),
            },
        );
        self
    }

    /// Never answer requests for a URL.
    pub fn with_hang(self, url: impl Into<String>) -> Self {
        self.answers
            .write()
            .unwrap()
            .insert(url.into(), MockAnswer::Hang);
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Track overlapping calls.
    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Every request received, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.read().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for MockModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.requests.write().unwrap().push(request.clone());
        let _guard = self.probe.as_ref().map(ConcurrencyProbe::enter);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let answer = self.answers.read().unwrap().get(&request.url).cloned();
        match answer {
            Some(MockAnswer::Json(text)) => Ok(text),
            Some(MockAnswer::Error { status, body }) => Err(ModelError::Api { status, body }),
            Some(MockAnswer::Hang) => std::future::pending().await,
            None => Err(ModelError::Empty),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_epoch();
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now().timestamp(), 90);
    }

    #[test]
    fn test_probe_tracks_peak() {
        let probe = ConcurrencyProbe::new();
        let a = probe.enter();
        let b = probe.enter();
        drop(a);
        let _c = probe.enter();
        drop(b);
        assert_eq!(probe.peak(), 2);
        assert_eq!(probe.current(), 1);
    }

    #[tokio::test]
    async fn test_mock_retriever_sequence() {
        let url = "https://example.org";
        let mock = MockRetriever::new(StrategyKind::PageFetch).with_responses(
            url,
            vec![MockResponse::Status(503), MockResponse::Text("ok".into())],
        );

        assert!(mock.retrieve(url).await.is_err());
        assert_eq!(mock.retrieve(url).await.unwrap().text, "ok");
        assert_eq!(mock.retrieve(url).await.unwrap().text, "ok");
        assert_eq!(mock.calls_for(url), 3);
        assert!(matches!(
            mock.retrieve("https://other.org").await,
            Err(RetrievalError::Status { status: 404 })
        ));
    }
}
