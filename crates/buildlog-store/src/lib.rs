//! BuildLog Store
//!
//! This crate implements the log layer of the buildlog status store - the
//! component responsible for recording per-step console output and serving
//! it, live, to any number of concurrent observers.
//!
//! ## What is the Log Layer?
//!
//! Each build step log is one append-only on-disk stream of channel-tagged
//! frames. The log layer handles:
//!
//! 1. **Run buffering**: consecutive same-channel writes accumulate in
//!    memory and flush as framed records on channel switches
//! 2. **Live fan-out**: every accepted chunk is pushed to all subscriber
//!    queues at write time, so viewers follow output without re-reading disk
//! 3. **Snapshot reads**: consistent point-in-time reads that stop at an
//!    explicit cut-off captured under the state lock
//! 4. **Catch-up streaming**: per-consumer sessions that replay disk and
//!    hand off to live delivery with no gap and no duplicate
//! 5. **Size caps**: body-byte truncation with an optional retained tail
//! 6. **Compression**: best-effort gzip of finished logs on the blocking
//!    pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │  Build step  │
//! └──────┬───────┘
//!        │ add_stdout / add_stderr / add_header / finish
//!        ▼
//! ┌─────────────────┐     frames      ┌──────────────┐
//! │    LogFile      │ ──────────────→ │ on-disk log  │
//! │ run + fan-out   │                 │ (maybe .gz)  │
//! └───┬─────────┬───┘                 └──────┬───────┘
//!     │ live    │ snapshot                   │ catch-up
//!     ▼         ▼                            ▼
//! ┌─────────────────────────────────────────────────┐
//! │ StreamSession per viewer: CATCHUP → LIVE → DONE │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! The `Completion` signal every status entity reports "finished" through
//! also lives here, next to its first consumer.

pub mod compress;
pub mod config;
pub mod error;
pub mod logfile;
pub mod signal;
pub mod streamer;

pub use config::{CompressConfig, CompressMethod, LogConfig};
pub use error::{Error, Result};
pub use logfile::{ChunkReader, LiveSubscription, LogEvent, LogFile};
pub use signal::Completion;
pub use streamer::{subscribe_consumer, LogConsumer, StreamSession};
