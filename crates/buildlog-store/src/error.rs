//! Log Store Error Types
//!
//! This module defines all error types that can occur during log store
//! operations.
//!
//! ## Error Categories
//!
//! ### I/O Errors
//! - `Io`: the log directory vanished, the disk filled up, or a read on a
//!   snapshot failed. Writer-side I/O errors propagate to (and fail) the
//!   enclosing build step; they are not retried here.
//!
//! ### Codec Errors
//! - `Codec`: the frame decoder hit a malformed record while reading a log
//!   back from disk.
//!
//! ### Compression Errors
//! - `Compression`: a compressed log variant could not be produced or read.
//!   Producing one is best-effort (logged, never fatal); reading one is not.
//!
//! Note that appending to a finished log and resolving a completion signal
//! twice are contract violations (panics), not members of this enum.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame codec error: {0}")]
    Codec(#[from] buildlog_core::Error),

    #[error("compression error: {0}")]
    Compression(String),
}
