//! Log Store Configuration
//!
//! This module defines configuration for the log write path.
//!
//! ## LogConfig
//!
//! Controls how chunks are framed, capped, streamed and compressed:
//!
//! - **chunk_size**: maximum frame payload size; a flushed run larger than
//!   this is split into multiple frames (default: 64KB)
//! - **read_block_size**: block size for catch-up and snapshot reads
//!   (default: 32KB)
//! - **queue_depth**: bounded queue depth per live subscriber; a full queue
//!   applies backpressure to the writer (default: 64)
//! - **log_max_size**: optional cap on body (non-header) bytes; output past
//!   the cap is discarded and announced once via a HEADER chunk
//! - **log_max_tail_size**: optional ring of that many trailing discarded
//!   bytes, written out when the log finishes
//! - **compress**: optional compression of finished logs over a size floor
//!
//! ## Usage
//!
//! ```ignore
//! use buildlog_store::{CompressConfig, CompressMethod, LogConfig};
//!
//! // Capped log with a 64KB tail, gzip-compressed once finished
//! let config = LogConfig {
//!     log_max_size: Some(10 * 1024 * 1024),
//!     log_max_tail_size: Some(64 * 1024),
//!     compress: Some(CompressConfig::default()),
//!     ..Default::default()
//! };
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Maximum frame payload size in bytes (default: 64KB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Read block size for catch-up and snapshot reads (default: 32KB)
    #[serde(default = "default_read_block_size")]
    pub read_block_size: usize,

    /// Bounded queue depth per live subscriber (default: 64)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Cap on body bytes; None = unlimited
    #[serde(default)]
    pub log_max_size: Option<u64>,

    /// Trailing discarded bytes to retain; None = discard outright
    #[serde(default)]
    pub log_max_tail_size: Option<usize>,

    /// Compression of finished logs (optional - if None, disabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<CompressConfig>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            read_block_size: default_read_block_size(),
            queue_depth: default_queue_depth(),
            log_max_size: None,
            log_max_tail_size: None,
            compress: None,
        }
    }
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_read_block_size() -> usize {
    32 * 1024
}

fn default_queue_depth() -> usize {
    64
}

/// Compression method for finished logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressMethod {
    Gzip,
}

impl CompressMethod {
    /// Filename suffix for this method.
    pub fn suffix(self) -> &'static str {
        match self {
            CompressMethod::Gzip => "gz",
        }
    }
}

/// Configuration for finished-log compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressConfig {
    /// Compression method (default: gzip)
    #[serde(default = "default_method")]
    pub method: CompressMethod,

    /// Only compress finished logs at least this large (default: 4KB)
    #[serde(default = "default_min_size")]
    pub min_size: u64,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            min_size: default_min_size(),
        }
    }
}

fn default_method() -> CompressMethod {
    CompressMethod::Gzip
}

fn default_min_size() -> u64 {
    4 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.queue_depth, 64);
        assert!(config.log_max_size.is_none());
        assert!(config.compress.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LogConfig =
            serde_json::from_str(r#"{"log_max_size": 1024, "compress": {"min_size": 1}}"#).unwrap();
        assert_eq!(config.log_max_size, Some(1024));
        assert_eq!(config.chunk_size, 64 * 1024);
        let compress = config.compress.unwrap();
        assert_eq!(compress.method, CompressMethod::Gzip);
        assert_eq!(compress.min_size, 1);
    }
}
