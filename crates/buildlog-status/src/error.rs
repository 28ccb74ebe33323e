//! Status Layer Error Types
//!
//! ## Error Categories
//!
//! ### Lookup Errors
//! - `BuildNotFound`: the requested build number is not in progress, not
//!   cached, and has no loadable snapshot on disk. A missing or corrupt
//!   snapshot maps here deliberately - a bad file on disk is an
//!   out-of-range answer to the caller, never fatal to the process.
//!
//! ### Snapshot Errors
//! - `Snapshot`: a snapshot could not be serialized, or carries a schema
//!   version this build does not understand.
//!
//! ### Pass-through
//! - `Store`: log layer failures bubbling up from step logs.
//! - `Io`: file system operations on the builder directory.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log store error: {0}")]
    Store(#[from] buildlog_store::Error),

    #[error("build not found: {0}")]
    BuildNotFound(u64),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}
