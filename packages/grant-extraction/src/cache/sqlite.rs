//! SQLite cache backend.
//!
//! One row per key. Good for single-host deployments that already keep a
//! database file around.

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::CacheBackend;
use crate::error::{CacheError, CacheResult};

fn backend_err(e: sqlx::Error) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// SQLite-based blob storage.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connect and create the table if needed.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./grant-cache.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> CacheResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(backend_err)?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Create an in-memory backend (for testing).
    pub async fn in_memory() -> CacheResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend_err)?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    async fn run_migrations(&self) -> CacheResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                body BLOB NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn load(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT body FROM cache_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_err)
    }

    async fn store(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, body) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(key)
        .bind(bytes)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT key FROM cache_entries")
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheKey};
    use std::time::Duration;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let cache = Cache::new(SqliteBackend::in_memory().await.unwrap());
        let key = CacheKey::retrieval("https://example.org");

        cache.put(&key, &"first".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.put(&key, &"second".to_string(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("second"));
        assert_eq!(cache.clear().await.unwrap(), 1);
    }
}
