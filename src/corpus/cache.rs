//! Corpus content cache
//!
//! One entry per resolved path. A load is triggered by the first reader and
//! coalesced per path, so concurrent requests for the same file share a
//! single disk read. An entry is replaced when the resolver reports a newer
//! modification time; a failed read never poisons other entries. Unbounded
//! by default; when a capacity is configured, least-recently-used entries
//! are evicted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::resolver::ResolvedFile;

/// Corpus file read failure. Surfaces as HTTP 500.
#[derive(Debug, thiserror::Error)]
#[error("failed to read corpus file {path}: {source}")]
pub struct LoadError {
    /// Path that failed to load
    pub path: PathBuf,
    source: std::io::Error,
}

struct CorpusEntry {
    content: Arc<String>,
    modified: SystemTime,
    last_used: Instant,
}

/// Cache of loaded corpus content keyed by resolved path.
pub struct CorpusCache {
    entries: DashMap<PathBuf, CorpusEntry>,
    /// Per-path load guards so concurrent misses coalesce onto one read
    loads: DashMap<PathBuf, Arc<Mutex<()>>>,
    max_entries: Option<usize>,
}

impl CorpusCache {
    /// Create a cache, optionally bounded to `max_entries` with LRU
    /// eviction.
    #[must_use]
    pub fn new(max_entries: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            loads: DashMap::new(),
            max_entries,
        }
    }

    /// Return the content for a resolved file, reading it at most once.
    ///
    /// The cached entry is reused while its modification marker matches the
    /// resolver's; otherwise the file is reloaded and the entry replaced.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if the file cannot be read.
    pub async fn load(&self, resolved: &ResolvedFile) -> Result<Arc<String>, LoadError> {
        if let Some(content) = self.fresh(resolved) {
            return Ok(content);
        }

        let guard = self
            .loads
            .entry(resolved.path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _flight = guard.lock().await;

        // A load that completed while we queued serves this request too
        if let Some(content) = self.fresh(resolved) {
            return Ok(content);
        }

        let read = tokio::fs::read_to_string(&resolved.path).await;
        // The guard entry must not outlive this load attempt, success or
        // not; waiters already hold their clone and re-check the cache.
        self.loads.remove(&resolved.path);
        let content = Arc::new(read.map_err(|source| LoadError {
            path: resolved.path.clone(),
            source,
        })?);

        info!(
            path = %resolved.path.display(),
            size = content.len(),
            "Loaded corpus file"
        );

        self.entries.insert(
            resolved.path.clone(),
            CorpusEntry {
                content: Arc::clone(&content),
                modified: resolved.modified,
                last_used: Instant::now(),
            },
        );
        self.evict_over_capacity();

        Ok(content)
    }

    /// Drop the cached entry for a path, if any.
    pub fn invalidate(&self, path: &Path) {
        if self.entries.remove(path).is_some() {
            debug!(path = %path.display(), "Invalidated corpus cache entry");
        }
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the entry if present and its modification marker still
    /// matches; evict it otherwise.
    fn fresh(&self, resolved: &ResolvedFile) -> Option<Arc<String>> {
        {
            let mut entry = self.entries.get_mut(&resolved.path)?;
            if entry.modified == resolved.modified {
                entry.last_used = Instant::now();
                return Some(Arc::clone(&entry.content));
            }
        }
        debug!(path = %resolved.path.display(), "Corpus file changed, dropping entry");
        self.entries.remove(&resolved.path);
        None
    }

    fn evict_over_capacity(&self) {
        let Some(cap) = self.max_entries else {
            return;
        };
        while self.entries.len() > cap {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_used)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    debug!(path = %key.display(), "Evicted least-recently-used corpus entry");
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::corpus::resolver::ResolutionMethod;

    fn resolved(path: &Path) -> ResolvedFile {
        let modified = fs::metadata(path).unwrap().modified().unwrap();
        ResolvedFile {
            path: path.to_path_buf(),
            method: ResolutionMethod::MountRoot,
            modified,
        }
    }

    fn corpus_file(tmp: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = tmp.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn second_load_is_served_from_cache() {
        let tmp = TempDir::new().unwrap();
        let path = corpus_file(&tmp, "codebase.txt", "the corpus");
        let cache = CorpusCache::new(None);

        let first = cache.load(&resolved(&path)).await.unwrap();
        let second = cache.load(&resolved(&path)).await.unwrap();

        assert_eq!(*first, "the corpus");
        // Same allocation proves the file was read once
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_loads_coalesce() {
        let tmp = TempDir::new().unwrap();
        let path = corpus_file(&tmp, "codebase.txt", "shared read");
        let cache = Arc::new(CorpusCache::new(None));

        let a = {
            let cache = Arc::clone(&cache);
            let resolved = resolved(&path);
            tokio::spawn(async move { cache.load(&resolved).await.unwrap() })
        };
        let b = {
            let cache = Arc::clone(&cache);
            let resolved = resolved(&path);
            tokio::spawn(async move { cache.load(&resolved).await.unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(*a, "shared read");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn changed_modification_marker_reloads() {
        let tmp = TempDir::new().unwrap();
        let path = corpus_file(&tmp, "codebase.txt", "version one");
        let cache = CorpusCache::new(None);

        let old = resolved(&path);
        assert_eq!(*cache.load(&old).await.unwrap(), "version one");

        fs::write(&path, "version two").unwrap();
        // Force a distinct marker even on filesystems with coarse mtimes
        let mut renewed = resolved(&path);
        renewed.modified = old.modified + std::time::Duration::from_secs(1);

        assert_eq!(*cache.load(&renewed).await.unwrap(), "version two");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reread() {
        let tmp = TempDir::new().unwrap();
        let path = corpus_file(&tmp, "codebase.txt", "content");
        let cache = CorpusCache::new(None);

        let first = cache.load(&resolved(&path)).await.unwrap();
        cache.invalidate(&path);
        assert!(cache.is_empty());

        let second = cache.load(&resolved(&path)).await.unwrap();
        assert_eq!(*first, *second);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn load_error_does_not_poison_other_entries() {
        let tmp = TempDir::new().unwrap();
        let good = corpus_file(&tmp, "good.txt", "fine");
        let cache = CorpusCache::new(None);

        let loaded = cache.load(&resolved(&good)).await.unwrap();

        // Resolved then removed before loading
        let gone = resolved(&good);
        let missing = ResolvedFile {
            path: tmp.path().join("missing.txt"),
            ..gone
        };
        assert!(cache.load(&missing).await.is_err());

        // The good entry is still cached
        let again = cache.load(&resolved(&good)).await.unwrap();
        assert!(Arc::ptr_eq(&loaded, &again));
    }

    #[tokio::test]
    async fn failed_load_releases_its_load_guard() {
        let tmp = TempDir::new().unwrap();
        let path = corpus_file(&tmp, "codebase.txt", "short-lived");
        let cache = CorpusCache::new(None);

        // Resolve first, then delete, so the read itself fails
        let stale = resolved(&path);
        fs::remove_file(&path).unwrap();
        assert!(cache.load(&stale).await.is_err());

        // The per-path guard must not accumulate for failing paths
        assert!(!cache.loads.contains_key(&stale.path));

        // The path works again once the file is back
        fs::write(&path, "restored").unwrap();
        let content = cache.load(&resolved(&path)).await.unwrap();
        assert_eq!(*content, "restored");
        assert!(!cache.loads.contains_key(&stale.path));
    }

    #[tokio::test]
    async fn capacity_bound_evicts_least_recently_used() {
        let tmp = TempDir::new().unwrap();
        let a = corpus_file(&tmp, "a.txt", "a");
        let b = corpus_file(&tmp, "b.txt", "b");
        let c = corpus_file(&tmp, "c.txt", "c");
        let cache = CorpusCache::new(Some(2));

        cache.load(&resolved(&a)).await.unwrap();
        cache.load(&resolved(&b)).await.unwrap();
        // Touch `a` so `b` becomes the eviction candidate
        cache.load(&resolved(&a)).await.unwrap();
        cache.load(&resolved(&c)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.entries.contains_key(&resolved(&a).path));
        assert!(cache.entries.contains_key(&resolved(&c).path));
        assert!(!cache.entries.contains_key(&resolved(&b).path));
    }
}
