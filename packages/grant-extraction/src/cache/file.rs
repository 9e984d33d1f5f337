//! File-per-entry cache backend.
//!
//! Each key lives in `<dir>/<key>.json`. Writes land in a temporary file in
//! the same directory and are renamed into place, so readers never observe a
//! half-written entry and one corrupt file never affects its neighbours.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use super::CacheBackend;
use crate::error::CacheResult;

const ENTRY_EXTENSION: &str = "json";
const TMP_SUFFIX: &str = ".tmp";

/// Directory-backed blob storage that survives restarts.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (creating if needed) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn load(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        let tmp = self.dir.join(format!(".{key}.{}{TMP_SUFFIX}", Uuid::new_v4()));
        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, self.entry_path(key)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    keys.push(stem.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn sweep_partial(&self) -> CacheResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with('.') && name.ends_with(TMP_SUFFIX)) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, CacheKey};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::retrieval("https://example.org/grant");

        {
            let cache = Cache::new(FileBackend::open(dir.path()).await.unwrap());
            cache
                .put(&key, &"page text".to_string(), Duration::from_secs(3600))
                .await
                .unwrap();
        }

        let reopened = Cache::new(FileBackend::open(dir.path()).await.unwrap());
        assert_eq!(
            reopened.get::<String>(&key).await.as_deref(),
            Some("page text")
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        let good = CacheKey::retrieval("https://good.example.org");
        let bad = CacheKey::retrieval("https://bad.example.org");

        let cache = Cache::new(backend.clone());
        cache.put(&good, &1u32, Duration::from_secs(60)).await.unwrap();
        std::fs::write(backend.entry_path(bad.as_str()), b"\x00\x01truncated").unwrap();

        assert_eq!(cache.get::<u32>(&bad).await, None);
        assert_eq!(cache.get::<u32>(&good).await, Some(1));
    }

    #[tokio::test]
    async fn test_keys_ignore_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).await.unwrap();
        backend.store("abc", b"{}").await.unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        assert_eq!(backend.keys().await.unwrap(), vec!["abc".to_string()]);
        assert!(backend.remove("abc").await.unwrap());
        assert!(!backend.remove("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_and_clear_sweep_interrupted_writes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(FileBackend::open(dir.path()).await.unwrap());
        let key = CacheKey::retrieval("https://example.org/grant");
        cache
            .put(&key, &"page text".to_string(), Duration::from_secs(3600))
            .await
            .unwrap();

        let leftover = dir.path().join(format!(".{}.0000.tmp", key.as_str()));
        std::fs::write(&leftover, b"{\"key\":").unwrap();
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert!(!leftover.exists());
        assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("page text"));

        std::fs::write(&leftover, b"{\"key\":").unwrap();
        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(!leftover.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
