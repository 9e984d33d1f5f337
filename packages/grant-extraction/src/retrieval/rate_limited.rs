//! Rate-limited retriever wrapper.
//!
//! Wraps any [`Retriever`] with a governor quota so quota-bound hosted
//! services see a bounded request rate regardless of pipeline concurrency.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};

use super::{ContentHint, Retriever};
use crate::error::RetrievalResult;
use crate::types::content::{RawContent, StrategyKind};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A retriever that waits for a quota permit before each request.
pub struct RateLimited<R: Retriever> {
    inner: R,
    limiter: Arc<DirectRateLimiter>,
}

impl<R: Retriever> RateLimited<R> {
    /// Limit to `requests_per_second`.
    pub fn new(inner: R, requests_per_second: NonZeroU32) -> Self {
        Self::with_quota(inner, Quota::per_second(requests_per_second))
    }

    /// Limit with a burst allowance on top of the sustained rate.
    pub fn with_burst(inner: R, requests_per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        Self::with_quota(inner, Quota::per_second(requests_per_second).allow_burst(burst))
    }

    pub fn with_quota(inner: R, quota: Quota) -> Self {
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: Retriever> Retriever for RateLimited<R> {
    async fn retrieve(&self, url: &str) -> RetrievalResult<RawContent> {
        self.limiter.until_ready().await;
        self.inner.retrieve(url).await
    }

    fn kind(&self) -> StrategyKind {
        self.inner.kind()
    }

    fn accepts(&self, url: &str, hint: ContentHint) -> bool {
        self.inner.accepts(url, hint)
    }

    fn timeout(&self) -> Option<Duration> {
        self.inner.timeout()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Extension trait for easy rate limiting.
pub trait RetrieverExt: Retriever + Sized {
    /// Wrap this retriever with a per-second quota.
    fn rate_limited(self, requests_per_second: NonZeroU32) -> RateLimited<Self> {
        RateLimited::new(self, requests_per_second)
    }

    /// Wrap with a per-second quota and burst allowance.
    fn rate_limited_with_burst(
        self,
        requests_per_second: NonZeroU32,
        burst: NonZeroU32,
    ) -> RateLimited<Self> {
        RateLimited::with_burst(self, requests_per_second, burst)
    }
}

impl<R: Retriever + Sized> RetrieverExt for R {}
