//! Integration tests for the retention sweeper
//!
//! Includes the reference horizon scenarios and protection of cache-resident
//! and in-progress builds.

use buildlog_status::{retention, BuildResult, BuilderStatus, RetentionConfig, StatusConfig};
use std::collections::HashSet;
use tempfile::TempDir;

async fn seed_files(dir: &TempDir, names: &[&str]) {
    for name in names {
        tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
    }
}

async fn remaining_files(dir: &TempDir) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    names
}

const SEEDED: &[&str] = &[
    "10",
    "11",
    "12",
    "12-log-bar",
    "12-log-foo",
    "13",
    "13-log-foo",
    "14",
    "14-log-bar",
    "14-log-foo",
];

#[tokio::test]
async fn test_build_horizon_five_log_horizon_two() {
    let dir = TempDir::new().unwrap();
    seed_files(&dir, SEEDED).await;

    let config = RetentionConfig {
        build_horizon: Some(5),
        log_horizon: Some(2),
    };
    let report = retention::prune(dir.path(), 15, &config, &HashSet::new())
        .await
        .unwrap();

    let expected: HashSet<String> = [
        "10",
        "11",
        "12",
        "13",
        "13-log-foo",
        "14",
        "14-log-bar",
        "14-log-foo",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    assert_eq!(remaining_files(&dir).await, expected);
    assert_eq!(report.snapshots_deleted, 0);
    assert_eq!(report.logs_deleted, 2);
}

#[tokio::test]
async fn test_build_horizon_two_log_horizon_unset() {
    let dir = TempDir::new().unwrap();
    seed_files(&dir, SEEDED).await;

    let config = RetentionConfig {
        build_horizon: Some(2),
        log_horizon: Some(0),
    };
    let report = retention::prune(dir.path(), 15, &config, &HashSet::new())
        .await
        .unwrap();

    let expected: HashSet<String> = ["13", "13-log-foo", "14", "14-log-bar", "14-log-foo"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(remaining_files(&dir).await, expected);
    assert_eq!(report.snapshots_deleted, 3);
    assert_eq!(report.logs_deleted, 2);
}

#[tokio::test]
async fn test_unlimited_horizons_delete_nothing() {
    let dir = TempDir::new().unwrap();
    seed_files(&dir, SEEDED).await;

    let report = retention::prune(dir.path(), 15, &RetentionConfig::default(), &HashSet::new())
        .await
        .unwrap();

    assert_eq!(remaining_files(&dir).await.len(), SEEDED.len());
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn test_log_horizon_alone_keeps_all_snapshots() {
    let dir = TempDir::new().unwrap();
    seed_files(&dir, SEEDED).await;

    let config = RetentionConfig {
        build_horizon: None,
        log_horizon: Some(1),
    };
    retention::prune(dir.path(), 15, &config, &HashSet::new())
        .await
        .unwrap();

    let remaining = remaining_files(&dir).await;
    // Every snapshot survives; only build 14's logs are recent enough.
    for snapshot in ["10", "11", "12", "13", "14"] {
        assert!(remaining.contains(snapshot));
    }
    assert!(remaining.contains("14-log-bar"));
    assert!(remaining.contains("14-log-foo"));
    assert!(!remaining.contains("12-log-bar"));
    assert!(!remaining.contains("13-log-foo"));
}

#[tokio::test]
async fn test_protected_builds_survive_any_horizon() {
    let dir = TempDir::new().unwrap();
    seed_files(&dir, SEEDED).await;

    let config = RetentionConfig {
        build_horizon: Some(1),
        log_horizon: Some(1),
    };
    let protected: HashSet<u64> = [12].into_iter().collect();
    retention::prune(dir.path(), 15, &config, &protected)
        .await
        .unwrap();

    let remaining = remaining_files(&dir).await;
    assert!(remaining.contains("12"));
    assert!(remaining.contains("12-log-bar"));
    assert!(remaining.contains("12-log-foo"));
    assert!(!remaining.contains("10"));
    assert!(!remaining.contains("13-log-foo"));
}

#[tokio::test]
async fn test_sweep_is_idempotent() {
    let dir = TempDir::new().unwrap();
    seed_files(&dir, SEEDED).await;

    let config = RetentionConfig {
        build_horizon: Some(2),
        log_horizon: Some(0),
    };
    retention::prune(dir.path(), 15, &config, &HashSet::new())
        .await
        .unwrap();
    let after_first = remaining_files(&dir).await;

    let report = retention::prune(dir.path(), 15, &config, &HashSet::new())
        .await
        .unwrap();
    assert_eq!(remaining_files(&dir).await, after_first);
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn test_sweep_after_build_finish_respects_cache_residency() {
    let dir = TempDir::new().unwrap();
    let config = StatusConfig {
        cache_capacity: 2,
        retention: RetentionConfig {
            build_horizon: Some(1),
            log_horizon: Some(1),
        },
        ..Default::default()
    };
    let builder = BuilderStatus::open("runner", dir.path(), config)
        .await
        .unwrap();

    // Three finished builds with a log each; horizon of 1 would normally
    // leave only the newest, but the two cache-resident builds survive.
    for _ in 0..3 {
        let build = builder.new_build().await;
        let step = build.add_step("compile").await;
        let log = step.new_log("stdio").await.unwrap();
        log.add_stdout("output\n").await.unwrap();
        step.finish(BuildResult::Success).await.unwrap();
        builder
            .build_finished(&build, BuildResult::Success)
            .await
            .unwrap();
    }

    let remaining = remaining_files(&dir).await;
    // Build 0 was evicted from the ring (capacity 2) and fell past the
    // horizon; builds 1 and 2 are resident and keep their files.
    assert!(!remaining.contains("0"));
    assert!(!remaining.contains("0-compile-stdio"));
    for name in ["1", "1-compile-stdio", "2", "2-compile-stdio"] {
        assert!(remaining.contains(name), "{name} should survive");
    }
}
