//! Build Status Records and Snapshots
//!
//! A `BuildStatus` is one concrete execution under a builder: ordered steps
//! (each owning zero or more logs), an overall result, timestamps and a
//! finished flag. It is mutated only by the owning execution engine until
//! `finish`, after which it is immutable and serialized to the builder
//! directory as `"<number>"`.
//!
//! ## Snapshots
//!
//! Persistence is an explicit, versioned struct per entity
//! (`BuildSnapshot` / `StepSnapshot` / `LogRef`) with field-by-field serde,
//! not an opaque object graph. Loading rejects unknown schema versions.
//! Snapshots are self-contained except for the owning-builder back
//! reference, which the loader relinks.

use crate::error::{Error, Result};
use crate::results::BuildResult;
use crate::step::{now_ms, sanitize_filename_part, StepSnapshot, StepStatus};
use buildlog_store::{Completion, LogConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Snapshot schema version understood by this build.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug)]
struct BuildInner {
    steps: Vec<Arc<StepStatus>>,
    result: Option<BuildResult>,
    started_at: Option<u64>,
    finished_at: Option<u64>,
    finished: bool,
}

/// Status record for one build.
#[derive(Debug)]
pub struct BuildStatus {
    builder_name: String,
    number: u64,
    dir: PathBuf,
    log_config: LogConfig,
    /// Log filename registry shared by all steps of this build.
    used_filenames: Arc<Mutex<HashMap<String, u32>>>,
    inner: RwLock<BuildInner>,
    finished: Completion<BuildResult>,
}

impl BuildStatus {
    pub(crate) fn new(
        builder_name: String,
        number: u64,
        dir: PathBuf,
        log_config: LogConfig,
    ) -> Self {
        Self {
            builder_name,
            number,
            dir,
            log_config,
            used_filenames: Arc::new(Mutex::new(HashMap::new())),
            inner: RwLock::new(BuildInner {
                steps: Vec::new(),
                result: None,
                started_at: Some(now_ms()),
                finished_at: None,
                finished: false,
            }),
            finished: Completion::new(),
        }
    }

    /// Reconstruct an immutable build from its snapshot, relinking the
    /// owning builder.
    pub(crate) fn from_snapshot(
        snapshot: BuildSnapshot,
        builder_name: &str,
        dir: PathBuf,
        log_config: LogConfig,
    ) -> Self {
        let steps = snapshot
            .steps
            .into_iter()
            .map(|s| Arc::new(StepStatus::from_snapshot(s, dir.clone(), log_config.clone())))
            .collect();
        let finished = Completion::new();
        if let Some(result) = snapshot.result {
            finished.resolve(result);
        }
        Self {
            builder_name: builder_name.to_string(),
            number: snapshot.number,
            dir,
            log_config,
            used_filenames: Arc::new(Mutex::new(HashMap::new())),
            inner: RwLock::new(BuildInner {
                steps,
                result: snapshot.result,
                started_at: snapshot.started_at,
                finished_at: snapshot.finished_at,
                finished: true,
            }),
            finished,
        }
    }

    pub fn builder_name(&self) -> &str {
        &self.builder_name
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Append a new step.
    ///
    /// # Panics
    ///
    /// Panics if the build already finished.
    pub async fn add_step(&self, name: impl Into<String>) -> Arc<StepStatus> {
        let name = name.into();
        let mut inner = self.inner.write().await;
        assert!(
            !inner.finished,
            "step added to finished build {}#{}",
            self.builder_name, self.number
        );
        let prefix = format!("{}-{}", self.number, sanitize_filename_part(&name));
        let step = Arc::new(StepStatus::new(
            name,
            self.dir.clone(),
            prefix,
            self.log_config.clone(),
            self.used_filenames.clone(),
        ));
        inner.steps.push(step.clone());
        step
    }

    /// Steps in creation order.
    pub async fn steps(&self) -> Vec<Arc<StepStatus>> {
        self.inner.read().await.steps.clone()
    }

    /// Finish the build, finishing any still-open steps first.
    ///
    /// After this the record is immutable. Calling twice is a no-op.
    pub async fn finish(&self, result: BuildResult) -> Result<()> {
        let steps = {
            let mut inner = self.inner.write().await;
            if inner.finished {
                return Ok(());
            }
            inner.finished = true;
            inner.finished_at = Some(now_ms());
            inner.result = Some(result);
            inner.steps.clone()
        };
        for step in steps {
            if !step.is_finished().await {
                step.finish(result).await?;
            }
        }
        info!(
            builder = %self.builder_name,
            build = self.number,
            result = ?result,
            "build finished"
        );
        self.finished.resolve(result);
        Ok(())
    }

    pub async fn is_finished(&self) -> bool {
        self.inner.read().await.finished
    }

    pub async fn result(&self) -> Option<BuildResult> {
        self.inner.read().await.result
    }

    pub async fn wait_until_finished(&self) -> BuildResult {
        self.finished.wait().await
    }

    /// The build's completion signal.
    pub fn finish_signal(&self) -> &Completion<BuildResult> {
        &self.finished
    }

    /// Serializable view of the record.
    pub async fn snapshot(&self) -> BuildSnapshot {
        let inner = self.inner.read().await;
        let mut steps = Vec::with_capacity(inner.steps.len());
        for step in &inner.steps {
            steps.push(step.snapshot().await);
        }
        BuildSnapshot {
            version: SNAPSHOT_VERSION,
            builder_name: self.builder_name.clone(),
            number: self.number,
            result: inner.result,
            started_at: inner.started_at,
            finished_at: inner.finished_at,
            steps,
        }
    }

    /// Write the snapshot to `"<builderDir>/<number>"`.
    ///
    /// Writes a temporary sibling first so readers never observe a
    /// half-written snapshot.
    pub async fn save(&self) -> Result<PathBuf> {
        let snapshot = self.snapshot().await;
        let path = self.dir.join(self.number.to_string());
        let tmp = self.dir.join(format!("{}.tmp", self.number));
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| Error::Snapshot(e.to_string()))?;
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(builder = %self.builder_name, build = self.number, path = ?path, "snapshot saved");
        Ok(path)
    }
}

/// Serialized form of a finished build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    pub version: u32,
    pub builder_name: String,
    pub number: u64,
    pub result: Option<BuildResult>,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub steps: Vec<StepSnapshot>,
}

impl BuildSnapshot {
    /// Load and validate the snapshot for `number` from a builder directory.
    pub async fn load(dir: &Path, number: u64) -> Result<BuildSnapshot> {
        let path = dir.join(number.to_string());
        let data = tokio::fs::read(&path).await?;
        let snapshot: BuildSnapshot = serde_json::from_slice(&data)
            .map_err(|e| Error::Snapshot(format!("corrupt snapshot {:?}: {}", path, e)))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Snapshot(format!(
                "unsupported snapshot version {} in {:?}",
                snapshot.version, path
            )));
        }
        Ok(snapshot)
    }
}
