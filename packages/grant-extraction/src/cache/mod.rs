//! TTL-bound, content-addressed cache for retrieval and extraction results.
//!
//! Backends store opaque bytes per key. [`Cache`] layers the entry envelope,
//! expiry and corruption handling on top:
//!
//! - `get` never fails. Missing, expired, corrupt and unreadable entries are
//!   all misses.
//! - Expired entries stay on disk until the next `put` to the same key or an
//!   explicit [`Cache::purge_expired`].
//!
//! Available backends:
//! - `MemoryBackend` - In-memory (always available)
//! - `FileBackend` - One JSON file per key (always available)
//! - `SqliteBackend` - SQLite table (requires `sqlite` feature)

pub mod file;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheResult;

/// Deterministic key for one cached operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for the retrieved content of a URL.
    pub fn retrieval(url: &str) -> Self {
        Self::digest(&["retrieval", url])
    }

    /// Key for the extracted records of a URL under a schema version.
    pub fn extraction(url: &str, schema_version: u32) -> Self {
        Self::digest(&["extraction", &format!("v{schema_version}"), url])
    }

    fn digest(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([0u8]);
            }
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted entry envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub payload: T,
}

/// Envelope fields needed for expiry decisions, payload ignored.
#[derive(Deserialize)]
struct EntryHeader {
    created_at: DateTime<Utc>,
    ttl_secs: u64,
}

/// True while `now - created_at <= ttl`. A TTL too large to represent never
/// expires.
fn is_fresh(created_at: DateTime<Utc>, ttl_secs: u64, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(created_at);
    match i64::try_from(ttl_secs).ok().and_then(chrono::Duration::try_seconds) {
        Some(ttl) => age <= ttl,
        None => true,
    }
}

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Raw byte storage, one blob per key.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read the blob for a key.
    async fn load(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Write (or overwrite) the blob for a key.
    ///
    /// A concurrent reader must see either the old blob or the new one.
    async fn store(&self, key: &str, bytes: &[u8]) -> CacheResult<()>;

    /// Remove a key. Returns whether it existed.
    async fn remove(&self, key: &str) -> CacheResult<bool>;

    /// Every stored key.
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Remove leftovers of interrupted writes. Returns how many were removed.
    async fn sweep_partial(&self) -> CacheResult<usize> {
        Ok(0)
    }

    /// Backend name for logging.
    fn name(&self) -> &str {
        "cache"
    }
}

/// Typed cache over a backend.
pub struct Cache<B> {
    backend: B,
    clock: Arc<dyn Clock>,
}

impl<B: CacheBackend> Cache<B> {
    /// Create a cache using wall-clock time.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current time according to the cache's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Look up a fresh value.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = match self.backend.load(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, backend = self.backend.name(), error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt cache entry, treating as miss");
                return None;
            }
        };

        if entry.key != key.as_str() {
            warn!(key = %key, stored = %entry.key, "cache entry key mismatch, treating as miss");
            return None;
        }

        if !is_fresh(entry.created_at, entry.ttl_secs, self.clock.now()) {
            debug!(key = %key, created_at = %entry.created_at, "cache entry expired");
            return None;
        }

        debug!(key = %key, "cache hit");
        Some(entry.payload)
    }

    /// Store a value, replacing whatever the key held.
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            created_at: self.clock.now(),
            ttl_secs: ttl.as_secs(),
            payload: value,
        };
        let bytes = serde_json::to_vec(&entry)?;
        self.backend.store(key.as_str(), &bytes).await?;
        debug!(key = %key, ttl_secs = ttl.as_secs(), "cache write");
        Ok(())
    }

    /// Remove expired and unreadable entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> CacheResult<usize> {
        let now = self.clock.now();
        let mut removed = 0;

        for key in self.backend.keys().await? {
            let stale = match self.backend.load(&key).await? {
                Some(bytes) => match serde_json::from_slice::<EntryHeader>(&bytes) {
                    Ok(header) => !is_fresh(header.created_at, header.ttl_secs, now),
                    Err(_) => true,
                },
                None => false,
            };
            if stale && self.backend.remove(&key).await? {
                removed += 1;
            }
        }

        let partial = self.backend.sweep_partial().await?;
        debug!(removed, partial, backend = self.backend.name(), "purged expired cache entries");
        Ok(removed)
    }

    /// Remove every entry. Returns how many were removed.
    pub async fn clear(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for key in self.backend.keys().await? {
            if self.backend.remove(&key).await? {
                removed += 1;
            }
        }
        self.backend.sweep_partial().await?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use proptest::prelude::*;

    fn cache_at(clock: &Arc<ManualClock>) -> Cache<MemoryBackend> {
        Cache::new(MemoryBackend::new()).with_clock(clock.clone())
    }

    #[test]
    fn test_keys_are_deterministic_and_namespaced() {
        let url = "https://example.org/grant";
        assert_eq!(CacheKey::retrieval(url), CacheKey::retrieval(url));
        assert_ne!(CacheKey::retrieval(url), CacheKey::extraction(url, 1));
        assert_ne!(CacheKey::extraction(url, 1), CacheKey::extraction(url, 2));
        assert_eq!(CacheKey::retrieval(url).as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_hit_before_ttl_miss_after() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = cache_at(&clock);
        let key = CacheKey::retrieval("https://example.org");

        cache
            .put(&key, &"payload".to_string(), Duration::from_secs(3600))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(59 * 60));
        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("payload"));

        clock.advance(Duration::from_secs(2 * 60));
        assert_eq!(cache.get::<String>(&key).await, None);
    }

    #[tokio::test]
    async fn test_get_is_idempotent() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = cache_at(&clock);
        let key = CacheKey::retrieval("https://example.org");

        assert_eq!(cache.get::<String>(&key).await, None);
        assert_eq!(cache.get::<String>(&key).await, None);

        cache.put(&key, &42u32, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get::<u32>(&key).await, Some(42));
        assert_eq!(cache.get::<u32>(&key).await, Some(42));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss_then_overwritten() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = cache_at(&clock);
        let key = CacheKey::retrieval("https://example.org");

        cache.backend().insert_raw(key.as_str(), b"{not json".to_vec()).await;
        assert_eq!(cache.get::<String>(&key).await, None);

        cache
            .put(&key, &"fresh".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = cache_at(&clock);
        let key = CacheKey::retrieval("https://example.org");
        let entry = format!(
            r#"{{"key":"{}","created_at":"1970-01-01T00:00:00Z","ttl_secs":{},"payload":"x"}}"#,
            key.as_str(),
            u64::MAX
        );
        cache.backend().insert_raw(key.as_str(), entry.into_bytes()).await;

        clock.advance(Duration::from_secs(10 * 365 * 24 * 60 * 60));
        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("x"));
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert_eq!(cache.backend().len().await, 1);
    }

    #[tokio::test]
    async fn test_wrong_payload_type_is_miss() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = cache_at(&clock);
        let key = CacheKey::retrieval("https://example.org");

        cache
            .put(&key, &"text".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get::<Vec<u32>>(&key).await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_kept_until_purge() {
        let clock = Arc::new(ManualClock::at_epoch());
        let cache = cache_at(&clock);
        let old = CacheKey::retrieval("https://old.example.org");
        let new = CacheKey::retrieval("https://new.example.org");

        cache.put(&old, &1u8, Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(120));
        cache.put(&new, &2u8, Duration::from_secs(60)).await.unwrap();
        cache.backend().insert_raw("garbage", b"???".to_vec()).await;

        assert_eq!(cache.backend().len().await, 3);
        assert_eq!(cache.purge_expired().await.unwrap(), 2);
        assert_eq!(cache.backend().len().await, 1);
        assert_eq!(cache.get::<u8>(&new).await, Some(2));
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let cache = Cache::new(MemoryBackend::new());
        for url in ["https://a.org", "https://b.org"] {
            cache
                .put(&CacheKey::retrieval(url), &url, Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert_eq!(cache.backend().len().await, 0);
    }

    proptest! {
        #[test]
        fn prop_hit_iff_age_within_ttl(ttl_secs in 1u64..100_000, elapsed_secs in 0u64..200_000) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(async {
                let clock = Arc::new(ManualClock::at_epoch());
                let cache = cache_at(&clock);
                let key = CacheKey::retrieval("https://example.org");

                cache.put(&key, &"v".to_string(), Duration::from_secs(ttl_secs)).await.unwrap();
                clock.advance(Duration::from_secs(elapsed_secs));

                let hit = cache.get::<String>(&key).await.is_some();
                prop_assert_eq!(hit, elapsed_secs <= ttl_secs);
                Ok(())
            })?;
        }
    }
}
