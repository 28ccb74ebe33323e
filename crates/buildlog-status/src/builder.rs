//! Builder Status Coordinator
//!
//! This module implements the top-level per-builder coordinator tying the
//! status layer together.
//!
//! ## What Does BuilderStatus Do?
//!
//! - Assigns build numbers: monotonically increasing, initialized from the
//!   highest number found on disk at startup, never reused
//! - Tracks the in-progress set (authoritative while a build runs)
//! - On build finish: saves the snapshot, moves the record into the cache,
//!   and triggers a retention sweep
//! - Serves lookups through the cache with transparent disk fallback
//!
//! ## Architecture
//!
//! ```text
//! BuilderStatus("runner")
//!     │
//!     ├─ in-progress: { 41 → BuildStatus }
//!     ├─ BuildCache: ring of recent finished builds + weak index
//!     └─ builder dir: 38  39  40  40-compile-stdio  41-compile-stdio ...
//! ```
//!
//! ## Lookup Order
//!
//! `get_build(n)` checks, in order: the in-progress set, the cache (strong
//! ring, then weak index), and finally the on-disk snapshot. A missing or
//! corrupt snapshot is a `BuildNotFound` answer, never a crash.

use crate::build::{BuildSnapshot, BuildStatus};
use crate::cache::{BuildCache, DEFAULT_CACHE_CAPACITY};
use crate::error::{Error, Result};
use crate::results::BuildResult;
use crate::retention::{self, RetentionConfig, RetentionReport};
use buildlog_store::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Configuration for one builder's status tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Strong-hold ring capacity (default: 15)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Retention horizons (default: unlimited)
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Log store configuration for step logs
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            retention: RetentionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

struct BuilderState {
    next_build_number: u64,
    in_progress: HashMap<u64, Arc<BuildStatus>>,
}

/// Per-builder status coordinator.
pub struct BuilderStatus {
    name: String,
    dir: PathBuf,
    config: StatusConfig,
    state: Mutex<BuilderState>,
    cache: BuildCache,
}

impl BuilderStatus {
    /// Open (or create) a builder directory and resume its number sequence.
    pub async fn open(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        config: StatusConfig,
    ) -> Result<Self> {
        let name = name.into();
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let next_build_number = scan_next_build_number(&dir).await?;
        info!(
            builder = %name,
            dir = ?dir,
            next_build_number,
            "builder status opened"
        );

        Ok(Self {
            name,
            dir,
            cache: BuildCache::new(config.cache_capacity),
            config,
            state: Mutex::new(BuilderState {
                next_build_number,
                in_progress: HashMap::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start a new build, assigning the next build number.
    pub async fn new_build(&self) -> Arc<BuildStatus> {
        let mut state = self.state.lock().await;
        let number = state.next_build_number;
        state.next_build_number += 1;
        let build = Arc::new(BuildStatus::new(
            self.name.clone(),
            number,
            self.dir.clone(),
            self.config.log.clone(),
        ));
        state.in_progress.insert(number, build.clone());
        info!(builder = %self.name, build = number, "build started");
        build
    }

    /// Finish a build: record the result, persist the snapshot, move the
    /// record into the cache and sweep retention.
    pub async fn build_finished(
        &self,
        build: &Arc<BuildStatus>,
        result: BuildResult,
    ) -> Result<()> {
        build.finish(result).await?;
        build.save().await?;

        self.state.lock().await.in_progress.remove(&build.number());
        self.cache.touch(build.clone()).await;

        // Disk pruning is best-effort; a failed sweep must not fail the
        // build's completion.
        if let Err(e) = self.prune().await {
            warn!(builder = %self.name, error = %e, "retention sweep failed");
        }
        Ok(())
    }

    /// Look up a build by number: in-progress set, cache, then disk.
    pub async fn get_build(&self, number: u64) -> Result<Arc<BuildStatus>> {
        if let Some(build) = self.state.lock().await.in_progress.get(&number) {
            return Ok(build.clone());
        }
        if let Some(build) = self.cache.get(number).await {
            return Ok(build);
        }

        let snapshot = match BuildSnapshot::load(&self.dir, number).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if !matches!(&e, Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound) {
                    warn!(builder = %self.name, build = number, error = %e, "unloadable snapshot");
                }
                return Err(Error::BuildNotFound(number));
            }
        };
        let build = Arc::new(BuildStatus::from_snapshot(
            snapshot,
            &self.name,
            self.dir.clone(),
            self.config.log.clone(),
        ));
        self.cache.touch(build.clone()).await;
        Ok(build)
    }

    /// Finished builds, newest first.
    ///
    /// Walks build numbers downward, skipping in-progress builds and
    /// numbers with no loadable snapshot, until `max_count` builds matched
    /// the optional results filter.
    pub async fn generate_finished_builds(
        &self,
        max_count: usize,
        results_filter: Option<&[BuildResult]>,
    ) -> Vec<Arc<BuildStatus>> {
        let mut found = Vec::new();
        if max_count == 0 {
            return found;
        }

        let mut number = {
            let state = self.state.lock().await;
            state.next_build_number
        };

        while number > 0 && found.len() < max_count {
            number -= 1;
            let Ok(build) = self.get_build(number).await else {
                continue;
            };
            if !build.is_finished().await {
                continue;
            }
            if let Some(filter) = results_filter {
                match build.result().await {
                    Some(result) if filter.contains(&result) => {}
                    _ => continue,
                }
            }
            found.push(build);
        }
        found
    }

    /// Sweep the builder directory, protecting resident and in-progress
    /// builds.
    pub async fn prune(&self) -> Result<RetentionReport> {
        let next_build_number = {
            let state = self.state.lock().await;
            state.next_build_number
        };
        let mut protected: HashSet<u64> = self.cache.resident().await;
        protected.extend(self.state.lock().await.in_progress.keys().copied());

        retention::prune(&self.dir, next_build_number, &self.config.retention, &protected).await
    }

    /// The cache, for observability.
    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }
}

/// Next build number = highest numbered artifact on disk + 1.
async fn scan_next_build_number(dir: &Path) -> Result<u64> {
    let mut highest: Option<u64> = None;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        let digits = match name.split_once('-') {
            Some((prefix, _)) => prefix,
            None => name.as_ref(),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(number) = digits.parse::<u64>() {
            highest = Some(highest.map_or(number, |h| h.max(number)));
        }
    }
    Ok(highest.map_or(0, |h| h + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_numbers_monotonic_and_resumed() {
        let dir = TempDir::new().unwrap();
        {
            let builder = BuilderStatus::open("runner", dir.path(), StatusConfig::default())
                .await
                .unwrap();
            let b0 = builder.new_build().await;
            let b1 = builder.new_build().await;
            assert_eq!(b0.number(), 0);
            assert_eq!(b1.number(), 1);
            builder
                .build_finished(&b0, BuildResult::Success)
                .await
                .unwrap();
            builder
                .build_finished(&b1, BuildResult::Success)
                .await
                .unwrap();
        }

        // Reopening resumes after the highest on-disk number.
        let builder = BuilderStatus::open("runner", dir.path(), StatusConfig::default())
            .await
            .unwrap();
        let b2 = builder.new_build().await;
        assert_eq!(b2.number(), 2);
        builder
            .build_finished(&b2, BuildResult::Success)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_build_checks_in_progress_first() {
        let dir = TempDir::new().unwrap();
        let builder = BuilderStatus::open("runner", dir.path(), StatusConfig::default())
            .await
            .unwrap();
        let build = builder.new_build().await;

        let found = builder.get_build(build.number()).await.unwrap();
        assert!(Arc::ptr_eq(&found, &build));
        builder
            .build_finished(&build, BuildResult::Success)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_build_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let builder = BuilderStatus::open("runner", dir.path(), StatusConfig::default())
            .await
            .unwrap();
        let err = builder.get_build(123).await.unwrap_err();
        assert!(matches!(err, Error::BuildNotFound(123)));
    }

    #[tokio::test]
    async fn test_get_build_corrupt_snapshot_is_not_found() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("5"), b"{ truncated").await.unwrap();
        let builder = BuilderStatus::open("runner", dir.path(), StatusConfig::default())
            .await
            .unwrap();
        let err = builder.get_build(5).await.unwrap_err();
        assert!(matches!(err, Error::BuildNotFound(5)));
    }

    #[tokio::test]
    async fn test_generate_finished_builds_newest_first_with_filter() {
        let dir = TempDir::new().unwrap();
        let builder = BuilderStatus::open("runner", dir.path(), StatusConfig::default())
            .await
            .unwrap();

        for result in [
            BuildResult::Success,
            BuildResult::Failure,
            BuildResult::Success,
        ] {
            let build = builder.new_build().await;
            builder.build_finished(&build, result).await.unwrap();
        }
        let running = builder.new_build().await;

        let recent = builder.generate_finished_builds(10, None).await;
        let numbers: Vec<u64> = recent.iter().map(|b| b.number()).collect();
        assert_eq!(numbers, vec![2, 1, 0]);

        let failures = builder
            .generate_finished_builds(10, Some(&[BuildResult::Failure]))
            .await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].number(), 1);

        builder
            .build_finished(&running, BuildResult::Success)
            .await
            .unwrap();
    }
}
