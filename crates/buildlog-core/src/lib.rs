//! BuildLog Core
//!
//! This crate defines the data model shared by every layer of the buildlog
//! status store, plus the on-disk frame codec.
//!
//! ## What Lives Here?
//!
//! 1. **Channel**: the fixed three-way tag (STDOUT / STDERR / HEADER) every
//!    piece of log output carries
//! 2. **Chunk**: an immutable `(channel, bytes)` unit of output
//! 3. **Frame codec**: encodes chunks into the self-delimiting ASCII record
//!    format logs are stored in, and decodes arbitrary byte fragments back
//!    into chunks with a streaming parser
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐
//! │  Build step  │
//! └──────┬───────┘
//!        │ stdout/stderr/header text
//!        ▼
//! ┌──────────────────┐
//! │   LogFile        │  (buildlog-store)
//! │ - buffers runs   │
//! │ - flushes frames │ ◄── encode_frame() lives here
//! └────────┬─────────┘
//!          │ framed bytes
//!          ▼
//! ┌──────────────────┐
//! │   on-disk log    │
//! └────────┬─────────┘
//!          │ framed bytes (any fragmentation)
//!          ▼
//! ┌──────────────────┐
//! │  FrameDecoder    │ ◄── streaming parser lives here
//! └────────┬─────────┘
//!          │ chunks
//!          ▼
//! ┌──────────────┐
//! │   Viewers    │
//! └──────────────┘
//! ```

pub mod chunk;
pub mod error;
pub mod frame;

pub use chunk::{Channel, ChannelSet, Chunk};
pub use error::{Error, Result};
pub use frame::{encode_frame, encoded_len, FrameDecoder};
