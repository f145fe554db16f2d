//! Citation list persisted to one JSON file.
//!
//! The check-fetch-write sequence runs under an exclusive advisory lock on a
//! sibling `.<name>.lock` file, so concurrent callers fetch at most once.

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::path::{Path, PathBuf};

use grc_core_types::Citation;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::errors::PlatformError;

#[derive(Clone, Debug)]
pub struct CitationCache {
    path: PathBuf,
}

impl CitationCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "citations.json".to_string());
        self.path.with_file_name(format!(".{name}.lock"))
    }

    /// Cached citations, or the result of `fetch` written to the cache first.
    /// An empty list is never served or stored.
    pub async fn load_or_fetch<F, Fut>(&self, fetch: F) -> Result<Vec<Citation>, PlatformError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Citation>, PlatformError>>,
    {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let lock_path = self.lock_path();
        let _lock = tokio::task::spawn_blocking(move || CacheLock::acquire(&lock_path))
            .await
            .map_err(|err| PlatformError::Cache(format!("lock task failed: {err}")))??;

        match self.read().await? {
            Some(cached) if !cached.is_empty() => {
                debug!(target: "platform-api", path = %self.path.display(), count = cached.len(), "citation cache hit");
                return Ok(cached);
            }
            Some(_) => {
                warn!(target: "platform-api", path = %self.path.display(), "citation cache is empty, refetching");
            }
            None => {}
        }

        let citations = fetch().await?;
        if citations.is_empty() {
            return Err(PlatformError::Cache(
                "expected citations to be populated".to_string(),
            ));
        }
        self.write(&citations).await?;
        info!(target: "platform-api", path = %self.path.display(), count = citations.len(), "citation cache written");
        Ok(citations)
    }

    async fn read(&self) -> Result<Option<Vec<Citation>>, PlatformError> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|err| {
                PlatformError::Cache(format!("{} is not a citation list: {err}", self.path.display()))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, citations: &[Citation]) -> Result<(), PlatformError> {
        let payload = serde_json::to_vec(citations)
            .map_err(|err| PlatformError::Cache(err.to_string()))?;
        write_atomic(&self.path, &payload).await?;
        Ok(())
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    fs::rename(tmp, path).await
}

/// Exclusive `flock` held until drop.
struct CacheLock {
    file: File,
}

impl CacheLock {
    fn acquire(path: &Path) -> Result<Self, PlatformError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if result != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
        }

        Ok(Self { file })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        // The lock file stays; removing it would let a waiter lock a dead inode.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn first_call_fetches_and_writes_second_reads_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CitationCache::new(dir.path().join("citations.json"));
        let fetches = AtomicUsize::new(0);

        let first = cache
            .load_or_fetch(|| async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Citation::new(1, "Encrypt data at rest")])
            })
            .await
            .unwrap();
        let second = cache
            .load_or_fetch(|| async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Citation::new(2, "should not be fetched")])
            })
            .await
            .unwrap();

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(cache.path()).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!([{"id": 1, "guidance": "Encrypt data at rest"}]));

        let json_files = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "json"))
            .count();
        assert_eq!(json_files, 1);
    }

    #[tokio::test]
    async fn fetch_errors_leave_no_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CitationCache::new(dir.path().join("citations.json"));
        let err = cache
            .load_or_fetch(|| async { Err(PlatformError::Http("down".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Http(_)));
        assert!(!cache.path().exists());
    }

    #[tokio::test]
    async fn empty_cache_file_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citations.json");
        std::fs::write(&path, b"[]").unwrap();
        let cache = CitationCache::new(&path);

        let citations = cache
            .load_or_fetch(|| async { Ok(vec![Citation::new(1, "Log privileged access")]) })
            .await
            .unwrap();

        assert_eq!(citations, vec![Citation::new(1, "Log privileged access")]);
        let on_disk: Vec<Citation> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, citations);
    }

    #[tokio::test]
    async fn empty_fetch_is_an_error_even_with_an_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citations.json");
        std::fs::write(&path, b"[]").unwrap();
        let err = CitationCache::new(&path)
            .load_or_fetch(|| async { Ok(Vec::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Cache(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"[]");
    }

    #[tokio::test]
    async fn corrupt_cache_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citations.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = CitationCache::new(&path)
            .load_or_fetch(|| async { Ok(Vec::new()) })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Cache(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_fetch_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CitationCache::new(dir.path().join("citations.json"));
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cache
                    .load_or_fetch(|| async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(vec![Citation::new(9, "Review access quarterly")])
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().len(), 1);
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
