//! Error Types for BuildLog Core
//!
//! This module defines the errors the data model and frame codec can produce.
//!
//! ## Error Categories
//!
//! ### I/O Errors
//! - File system operations on log files
//!
//! ### Framing Errors
//! - `BadLengthPrefix`: a record's decimal length prefix is malformed
//!   (non-digit byte, or so long it cannot be a real record)
//! - `InvalidChannel`: the channel tag digit is not `0`, `1` or `2`
//! - `MissingTerminator`: the byte after a record payload is not `,`
//! - `EmptyRecord`: a record declared a zero-byte body (no room for the
//!   channel tag)
//!
//! ## Usage
//! All fallible functions in this crate return `Result<T>` which is aliased
//! to `Result<T, Error>`, so callers can propagate with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad frame length prefix: {0}")]
    BadLengthPrefix(String),

    #[error("invalid channel tag: {0}")]
    InvalidChannel(u8),

    #[error("frame not terminated by ',' (found 0x{0:02x})")]
    MissingTerminator(u8),

    #[error("frame declares an empty record")]
    EmptyRecord,
}

pub type Result<T> = std::result::Result<T, Error>;
