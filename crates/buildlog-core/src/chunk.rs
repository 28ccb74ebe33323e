//! Chunk Data Structures
//!
//! This module defines the core `Chunk` type - the fundamental unit of log
//! output in buildlog - and the `Channel` tag it carries.
//!
//! ## What is a Chunk?
//! A chunk is one write made by a running build step, similar to:
//! - One `write()` to a process's stdout or stderr
//! - One annotation line injected by the build master itself (HEADER)
//!
//! ## Structure
//! Each chunk contains:
//! - **channel**: which of the three fixed streams the bytes belong to
//! - **payload**: the actual bytes (arbitrary, not necessarily valid UTF-8)
//!
//! ## Design Decisions
//! - Uses `bytes::Bytes` for zero-copy hand-off between the store, live
//!   subscribers, and snapshot readers
//! - Chunks are immutable once created
//! - The channel set is closed: exactly STDOUT, STDERR and HEADER

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Origin/kind tag for a chunk of log output.
///
/// The numeric value doubles as the single-digit channel tag in the on-disk
/// frame format (`0` = stdout, `1` = stderr, `2` = header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    Stdout = 0,
    Stderr = 1,
    Header = 2,
}

impl Channel {
    /// The ASCII digit used for this channel in the frame format.
    pub fn digit(self) -> u8 {
        b'0' + self as u8
    }

    /// Parse an ASCII channel digit back into a channel.
    pub fn from_digit(digit: u8) -> Option<Channel> {
        match digit {
            b'0' => Some(Channel::Stdout),
            b'1' => Some(Channel::Stderr),
            b'2' => Some(Channel::Header),
            _ => None,
        }
    }

    /// True for the two body channels (everything except HEADER).
    ///
    /// Truncation caps are counted over body bytes only.
    pub fn is_body(self) -> bool {
        !matches!(self, Channel::Header)
    }
}

/// A single immutable unit of log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Which stream the bytes belong to
    pub channel: Channel,

    /// Payload bytes
    pub payload: Bytes,
}

impl Chunk {
    pub fn new(channel: Channel, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    pub fn stdout(payload: impl Into<Bytes>) -> Self {
        Self::new(Channel::Stdout, payload)
    }

    pub fn stderr(payload: impl Into<Bytes>) -> Self {
        Self::new(Channel::Stderr, payload)
    }

    pub fn header(payload: impl Into<Bytes>) -> Self {
        Self::new(Channel::Header, payload)
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A read-side filter over channels.
///
/// The empty set means "no filtering" (all channels pass), matching the
/// convention of the snapshot-read API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSet(u8);

impl ChannelSet {
    /// The empty filter: every channel passes.
    pub fn all() -> Self {
        ChannelSet(0)
    }

    /// A filter passing exactly the given channels.
    pub fn of(channels: &[Channel]) -> Self {
        let mut mask = 0u8;
        for ch in channels {
            mask |= 1 << (*ch as u8);
        }
        ChannelSet(mask)
    }

    /// Body channels only (stdout + stderr).
    pub fn body() -> Self {
        Self::of(&[Channel::Stdout, Channel::Stderr])
    }

    pub fn contains(self, channel: Channel) -> bool {
        self.0 == 0 || self.0 & (1 << (channel as u8)) != 0
    }
}
