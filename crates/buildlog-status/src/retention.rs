//! Age-Based Retention Pruning
//!
//! This module bounds a builder directory's disk usage by deleting build
//! artifacts older than configurable horizons, expressed in build-number
//! count.
//!
//! ## Horizons
//!
//! - **build_horizon**: keep full build snapshots for the most recent N
//!   build numbers (0/unset = unlimited).
//! - **log_horizon**: keep individual step logs for the most recent M <= N
//!   build numbers. Logs for builds older than that but still within
//!   `build_horizon` are deleted while the snapshot itself is retained.
//!
//! ## Algorithm
//!
//! ```text
//! earliest_build = next_build_number - build_horizon
//! earliest_log   = max(earliest_build, next_build_number - log_horizon)
//!
//! for each file in the builder directory:
//!     "<num>"      → snapshot: delete if num < earliest_build
//!     "<num>-..."  → step log: delete if num < earliest_log
//!     anything else → ignore
//! ```
//!
//! Files belonging to a protected build number (cache-resident or in
//! progress) are never deleted, regardless of horizon. The sweep runs after
//! each build finishes and is safe to run idempotently at any time.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Retention horizons, in build-number count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Keep full build snapshots for this many recent builds; None or 0 =
    /// unlimited
    #[serde(default)]
    pub build_horizon: Option<u64>,

    /// Keep step logs for this many recent builds; None or 0 = same as
    /// `build_horizon`
    #[serde(default)]
    pub log_horizon: Option<u64>,
}

impl RetentionConfig {
    fn effective_horizon(value: Option<u64>) -> Option<u64> {
        match value {
            None | Some(0) => None,
            Some(h) => Some(h),
        }
    }
}

/// What one sweep deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub snapshots_deleted: usize,
    pub logs_deleted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Snapshot,
    Log,
}

/// Classify a builder-directory filename.
///
/// `"<num>"` is a build snapshot; `"<num>-..."` is a step log belonging to
/// that build (including compressed `.gz` variants, which still carry the
/// `"<num>-"` prefix). Anything else is not ours to touch.
fn parse_entry(name: &str) -> Option<(u64, EntryKind)> {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        return name.parse().ok().map(|n| (n, EntryKind::Snapshot));
    }
    let (prefix, _) = name.split_once('-')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok().map(|n| (n, EntryKind::Log))
}

/// Sweep a builder directory.
///
/// `protected` holds build numbers that must survive regardless of horizon:
/// the cache's strong-hold ring plus the in-progress set.
pub async fn prune(
    dir: &Path,
    next_build_number: u64,
    config: &RetentionConfig,
    protected: &HashSet<u64>,
) -> Result<RetentionReport> {
    let build_horizon = RetentionConfig::effective_horizon(config.build_horizon);
    let log_horizon = RetentionConfig::effective_horizon(config.log_horizon);

    let earliest_build = match build_horizon {
        Some(h) => next_build_number.saturating_sub(h),
        None => 0,
    };
    let earliest_log = match log_horizon {
        Some(h) => earliest_build.max(next_build_number.saturating_sub(h)),
        None => earliest_build,
    };

    let mut report = RetentionReport::default();
    if earliest_build == 0 && earliest_log == 0 {
        return Ok(report);
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        let Some((number, kind)) = parse_entry(&name) else {
            continue;
        };

        let expired = match kind {
            EntryKind::Snapshot => number < earliest_build,
            EntryKind::Log => number < earliest_log,
        };
        if !expired {
            continue;
        }
        if protected.contains(&number) {
            debug!(build = number, file = %name, "retention skipping protected build");
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!(build = number, file = %name, "retention deleted file");
                match kind {
                    EntryKind::Snapshot => report.snapshots_deleted += 1,
                    EntryKind::Log => report.logs_deleted += 1,
                }
            }
            Err(e) => {
                warn!(build = number, file = %name, error = %e, "retention delete failed");
            }
        }
    }

    if report.snapshots_deleted > 0 || report.logs_deleted > 0 {
        info!(
            dir = ?dir,
            snapshots_deleted = report.snapshots_deleted,
            logs_deleted = report.logs_deleted,
            earliest_build,
            earliest_log,
            "retention sweep complete"
        );
    }
    Ok(report)
}
