//! Step Status Records
//!
//! A `StepStatus` tracks one step of a running build: its logs, timestamps
//! and terminal result. The owning execution engine mutates it until the
//! step finishes; observers wait on its completion signal.
//!
//! Log filenames follow the builder directory convention
//! `"<buildNumber>-<stepName>-<logName>[_<n>]"`, with `_<n>` disambiguating
//! name collisions within one build.

use crate::error::Result;
use crate::results::BuildResult;
use buildlog_store::{Completion, LogConfig, LogFile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Pointer to a step log's on-disk file, stable across build reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRef {
    /// Log name as requested by the step (e.g. "stdio")
    pub name: String,

    /// Filename within the builder directory
    pub filename: String,
}

#[derive(Debug)]
struct StepInner {
    started_at: Option<u64>,
    finished_at: Option<u64>,
    result: Option<BuildResult>,
    /// Live log writers; empty on builds reloaded from a snapshot.
    logs: Vec<Arc<LogFile>>,
    log_refs: Vec<LogRef>,
    finished: bool,
}

/// Status record for one build step.
#[derive(Debug)]
pub struct StepStatus {
    name: String,
    /// Builder directory logs are created in.
    dir: PathBuf,
    /// `"<buildNumber>-<stepName>"`.
    file_prefix: String,
    log_config: LogConfig,
    /// Per-build registry of allocated log filenames, shared across steps.
    used_filenames: Arc<Mutex<HashMap<String, u32>>>,
    inner: RwLock<StepInner>,
    finished: Completion<BuildResult>,
}

impl StepStatus {
    pub(crate) fn new(
        name: String,
        dir: PathBuf,
        file_prefix: String,
        log_config: LogConfig,
        used_filenames: Arc<Mutex<HashMap<String, u32>>>,
    ) -> Self {
        Self {
            name,
            dir,
            file_prefix,
            log_config,
            used_filenames,
            inner: RwLock::new(StepInner {
                started_at: None,
                finished_at: None,
                result: None,
                logs: Vec::new(),
                log_refs: Vec::new(),
                finished: false,
            }),
            finished: Completion::new(),
        }
    }

    /// Reconstruct a finished step from its snapshot fields.
    pub(crate) fn from_snapshot(snapshot: StepSnapshot, dir: PathBuf, log_config: LogConfig) -> Self {
        let finished = Completion::new();
        if let Some(result) = snapshot.result {
            finished.resolve(result);
        }
        Self {
            name: snapshot.name,
            dir,
            file_prefix: String::new(),
            log_config,
            used_filenames: Arc::new(Mutex::new(HashMap::new())),
            inner: RwLock::new(StepInner {
                started_at: snapshot.started_at,
                finished_at: snapshot.finished_at,
                result: snapshot.result,
                logs: Vec::new(),
                log_refs: snapshot.logs,
                finished: true,
            }),
            finished,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark the step started.
    pub async fn start(&self) {
        let mut inner = self.inner.write().await;
        if inner.started_at.is_none() {
            inner.started_at = Some(now_ms());
        }
    }

    /// Create a new log for this step.
    ///
    /// # Panics
    ///
    /// Panics if the step already finished.
    pub async fn new_log(&self, log_name: impl Into<String>) -> Result<Arc<LogFile>> {
        let log_name = log_name.into();
        let base = format!(
            "{}-{}",
            self.file_prefix,
            sanitize_filename_part(&log_name)
        );
        let filename = {
            let mut used = self.used_filenames.lock().await;
            let count = used.entry(base.clone()).or_insert(0);
            let filename = if *count == 0 {
                base.clone()
            } else {
                format!("{}_{}", base, count)
            };
            *count += 1;
            filename
        };

        let mut inner = self.inner.write().await;
        assert!(!inner.finished, "log added to finished step {:?}", self.name);

        let log = Arc::new(
            LogFile::create(
                log_name.clone(),
                self.dir.join(&filename),
                self.log_config.clone(),
            )
            .await?,
        );
        inner.logs.push(log.clone());
        inner.log_refs.push(LogRef {
            name: log_name,
            filename,
        });
        Ok(log)
    }

    /// Live log writers, in creation order.
    pub async fn logs(&self) -> Vec<Arc<LogFile>> {
        self.inner.read().await.logs.clone()
    }

    /// Find a live log by name.
    pub async fn get_log(&self, name: &str) -> Option<Arc<LogFile>> {
        self.inner
            .read()
            .await
            .logs
            .iter()
            .find(|l| l.name() == name)
            .cloned()
    }

    /// On-disk log references, in creation order.
    pub async fn log_refs(&self) -> Vec<LogRef> {
        self.inner.read().await.log_refs.clone()
    }

    /// Finish the step, finishing any still-open logs first.
    pub async fn finish(&self, result: BuildResult) -> Result<()> {
        let logs = {
            let mut inner = self.inner.write().await;
            if inner.finished {
                return Ok(());
            }
            inner.finished = true;
            inner.finished_at = Some(now_ms());
            inner.result = Some(result);
            inner.logs.clone()
        };
        for log in logs {
            log.finish().await?;
        }
        debug!(step = %self.name, result = ?result, "step finished");
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

    pub(crate) async fn snapshot(&self) -> StepSnapshot {
        let inner = self.inner.read().await;
        StepSnapshot {
            name: self.name.clone(),
            result: inner.result,
            started_at: inner.started_at,
            finished_at: inner.finished_at,
            logs: inner.log_refs.clone(),
        }
    }
}

/// Serialized form of a finished step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub name: String,
    pub result: Option<BuildResult>,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    pub logs: Vec<LogRef>,
}

/// Replace characters that would break the flat-file naming convention.
pub(crate) fn sanitize_filename_part(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Current timestamp in milliseconds since the epoch.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_step(dir: &TempDir) -> StepStatus {
        StepStatus::new(
            "compile".to_string(),
            dir.path().to_path_buf(),
            "3-compile".to_string(),
            LogConfig::default(),
            Arc::new(Mutex::new(HashMap::new())),
        )
    }

    #[tokio::test]
    async fn test_log_filename_allocation_with_collisions() {
        let dir = TempDir::new().unwrap();
        let step = make_step(&dir);

        step.new_log("stdio").await.unwrap();
        step.new_log("stdio").await.unwrap();
        step.new_log("stdio").await.unwrap();

        let refs = step.log_refs().await;
        assert_eq!(refs[0].filename, "3-compile-stdio");
        assert_eq!(refs[1].filename, "3-compile-stdio_1");
        assert_eq!(refs[2].filename, "3-compile-stdio_2");
        for r in &refs {
            assert!(dir.path().join(&r.filename).exists());
        }
        step.finish(BuildResult::Success).await.unwrap();
    }

    #[tokio::test]
    async fn test_sanitized_log_names() {
        let dir = TempDir::new().unwrap();
        let step = make_step(&dir);

        step.new_log("sub/path log").await.unwrap();
        let refs = step.log_refs().await;
        assert_eq!(refs[0].filename, "3-compile-sub_path_log");
        step.finish(BuildResult::Success).await.unwrap();
    }

    #[tokio::test]
    async fn test_finish_closes_open_logs_and_resolves_signal() {
        let dir = TempDir::new().unwrap();
        let step = Arc::new(make_step(&dir));
        let log = step.new_log("stdio").await.unwrap();
        log.add_stdout("output").await.unwrap();

        let waiter = tokio::spawn({
            let step = step.clone();
            async move { step.wait_until_finished().await }
        });
        tokio::task::yield_now().await;

        step.start().await;
        step.finish(BuildResult::Warnings).await.unwrap();

        assert!(log.is_finished().await);
        assert_eq!(waiter.await.unwrap(), BuildResult::Warnings);
        assert_eq!(step.result().await, Some(BuildResult::Warnings));
    }

    #[tokio::test]
    #[should_panic(expected = "log added to finished step")]
    async fn test_new_log_after_finish_panics() {
        let dir = TempDir::new().unwrap();
        let step = make_step(&dir);
        step.finish(BuildResult::Success).await.unwrap();
        let _ = step.new_log("stdio").await;
    }
}
