//! Build Cache with LRU Strong-Hold Ring
//!
//! This module implements the bounded in-memory cache of recently touched
//! finished builds.
//!
//! ## Why Caching?
//!
//! Status consumers (web views, notifiers) hit the same handful of recent
//! builds over and over. Reloading a snapshot from disk on every lookup
//! would put JSON parsing on every page view; holding every build forever
//! would grow without bound over the life of a long-running master.
//!
//! ## How It Works
//!
//! Two layers, checked in order:
//!
//! 1. **Strong-hold ring**: a bounded `LruCache` holding real `Arc`s to the
//!    most recently touched N builds. Eviction just drops the strong
//!    reference - nothing is written or deleted.
//! 2. **Weak index**: `Weak` pointers that still resolve while anything
//!    else (an in-flight page render, a notifier) keeps the build alive.
//!    A weak hit is promoted back into the ring.
//!
//! Whether a build is resident is a first-class queryable fact
//! (`resident()`), not an emergent property of collection timing - the
//! retention sweeper refuses to delete resident builds' files.
//!
//! Identity is only guaranteed while resident: after eviction and drop, a
//! reload produces a new object whose observable fields equal the
//! serialized snapshot.

use crate::build::BuildStatus;
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::debug;

/// Default strong-hold ring capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 15;

struct CacheInner {
    strong: LruCache<u64, Arc<BuildStatus>>,
    weak: HashMap<u64, Weak<BuildStatus>>,
}

/// Bounded cache of finished builds for one builder.
pub struct BuildCache {
    inner: Mutex<CacheInner>,
}

impl BuildCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(CacheInner {
                strong: LruCache::new(capacity),
                weak: HashMap::new(),
            }),
        }
    }

    /// Look up a build, promoting it to most recently used.
    pub async fn get(&self, number: u64) -> Option<Arc<BuildStatus>> {
        let mut inner = self.inner.lock().await;

        if let Some(build) = inner.strong.get(&number) {
            return Some(build.clone());
        }

        // Not strongly held; something else may still keep it alive.
        match inner.weak.get(&number).and_then(Weak::upgrade) {
            Some(build) => {
                debug!(build = number, "weak cache hit, promoting");
                Self::insert(&mut inner, build.clone());
                Some(build)
            }
            None => {
                inner.weak.remove(&number);
                None
            }
        }
    }

    /// Insert or move a build to the front of the strong-hold ring.
    pub async fn touch(&self, build: Arc<BuildStatus>) {
        let mut inner = self.inner.lock().await;
        Self::insert(&mut inner, build);
    }

    fn insert(inner: &mut CacheInner, build: Arc<BuildStatus>) {
        let number = build.number();
        inner.weak.insert(number, Arc::downgrade(&build));
        if let Some((evicted, _)) = inner.strong.push(number, build) {
            if evicted != number {
                debug!(build = evicted, "evicted from strong-hold ring");
            }
        }
        // Drop dead weak entries opportunistically.
        inner.weak.retain(|_, w| w.strong_count() > 0);
    }

    /// Build numbers currently in the strong-hold ring.
    ///
    /// These are protected from retention pruning.
    pub async fn resident(&self) -> HashSet<u64> {
        self.inner
            .lock()
            .await
            .strong
            .iter()
            .map(|(number, _)| *number)
            .collect()
    }

    pub async fn contains(&self, number: u64) -> bool {
        self.inner.lock().await.strong.contains(&number)
    }

    /// Cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            strong_entries: inner.strong.len(),
            capacity: inner.strong.cap().get(),
            weak_entries: inner.weak.len(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Builds held in the strong-hold ring
    pub strong_entries: usize,

    /// Ring capacity
    pub capacity: usize,

    /// Weak index entries (including the strongly held ones)
    pub weak_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildlog_store::LogConfig;
    use tempfile::TempDir;

    fn make_build(dir: &TempDir, number: u64) -> Arc<BuildStatus> {
        Arc::new(BuildStatus::new(
            "runner".to_string(),
            number,
            dir.path().to_path_buf(),
            LogConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_get_returns_identical_object_while_resident() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(4);
        let build = make_build(&dir, 1);
        cache.touch(build.clone()).await;

        let a = cache.get(1).await.unwrap();
        let b = cache.get(1).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &build));
    }

    #[tokio::test]
    async fn test_ring_evicts_least_recently_touched() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(2);
        cache.touch(make_build(&dir, 1)).await;
        cache.touch(make_build(&dir, 2)).await;

        // Touch 1 so 2 becomes the eviction candidate.
        cache.get(1).await.unwrap();
        cache.touch(make_build(&dir, 3)).await;

        let resident = cache.resident().await;
        assert!(resident.contains(&1));
        assert!(!resident.contains(&2));
        assert!(resident.contains(&3));
    }

    #[tokio::test]
    async fn test_evicted_build_gone_once_unreferenced() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(1);
        cache.touch(make_build(&dir, 1)).await;
        cache.touch(make_build(&dir, 2)).await;

        assert!(cache.get(1).await.is_none());
        assert!(cache.get(2).await.is_some());
    }

    #[tokio::test]
    async fn test_weak_index_resolves_while_externally_held() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(1);
        let held = make_build(&dir, 1);
        cache.touch(held.clone()).await;

        // Evict 1 from the ring; the external Arc keeps it alive.
        cache.touch(make_build(&dir, 2)).await;
        assert!(!cache.contains(1).await);

        let found = cache.get(1).await.unwrap();
        assert!(Arc::ptr_eq(&found, &held));
        // The weak hit was promoted back into the ring.
        assert!(cache.contains(1).await);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(3);
        cache.touch(make_build(&dir, 1)).await;
        cache.touch(make_build(&dir, 2)).await;

        let stats = cache.stats().await;
        assert_eq!(stats.strong_entries, 2);
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.weak_entries, 2);
    }
}
