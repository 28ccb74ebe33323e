//! BuildLog Status
//!
//! This crate implements the status layer of the buildlog store - the
//! component responsible for tracking builds, steps and build sets, caching
//! recent build records in bounded memory, and pruning old artifacts from
//! disk.
//!
//! ## Main Components
//!
//! ### BuilderStatus
//! Per-builder coordinator: assigns monotonically increasing build numbers,
//! tracks in-progress builds, persists finished builds as versioned JSON
//! snapshots, and serves lookups through the cache.
//!
//! ### BuildStatus / StepStatus / BuildSetStatus
//! The status records themselves. Each carries a one-shot completion signal
//! observers wait on; build sets carry a second, earlier-firing signal for
//! "can no longer succeed".
//!
//! ### BuildCache
//! Bounded LRU strong-hold ring over recently touched finished builds, with
//! a weak index behind it and transparent snapshot reload on miss.
//!
//! ### Retention
//! Age-based sweep of the builder directory driven by build/log horizons,
//! never touching cache-resident or in-progress builds.
//!
//! ## Data Flow
//!
//! ```text
//! execution engine                       observers
//!   │ new_build / add_step / new_log        │ get_build / wait_until_finished
//!   ▼                                       ▼
//! BuilderStatus ── build finished ──→ snapshot on disk
//!   │                                       ▲
//!   └── BuildCache (ring + weak) ───────────┘ reload on miss
//!                │
//!                └── protects builds from the retention sweep
//! ```

pub mod build;
pub mod builder;
pub mod buildset;
pub mod cache;
pub mod error;
pub mod results;
pub mod retention;
pub mod step;

pub use build::{BuildSnapshot, BuildStatus, SNAPSHOT_VERSION};
pub use builder::{BuilderStatus, StatusConfig};
pub use buildset::BuildSetStatus;
pub use cache::{BuildCache, CacheStats, DEFAULT_CACHE_CAPACITY};
pub use error::{Error, Result};
pub use results::BuildResult;
pub use retention::{RetentionConfig, RetentionReport};
pub use step::{LogRef, StepSnapshot, StepStatus};
