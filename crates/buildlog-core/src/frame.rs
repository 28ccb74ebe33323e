//! Frame Codec
//!
//! This module implements the self-delimiting record format log files are
//! stored in.
//!
//! ## File Format
//!
//! A log file is a plain concatenation of ASCII-framed records with no outer
//! framing:
//!
//! ```text
//! [Record 1][Record 2]...[Record N]
//!
//! Record:
//! ┌───────────┬─────┬─────────────┬─────────┬─────┐
//! │ Length    │ ':' │ Channel tag │ Payload │ ',' │
//! │ (decimal) │     │ (1 digit)   │ (bytes) │     │
//! └───────────┴─────┴─────────────┴─────────┴─────┘
//! ```
//!
//! The length is the decimal byte count of channel tag + payload combined,
//! so `"6:0hello,"` is a 5-byte stdout payload. Channel tags are `0` for
//! stdout, `1` for stderr, `2` for header.
//!
//! ## Streaming Decoding
//!
//! Readers receive log bytes in arbitrary fragments: bounded disk blocks
//! during catch-up, whatever a decompressor hands back, or a partial tail
//! while the writer is mid-record. `FrameDecoder` accepts any fragmentation,
//! yields complete chunks as soon as a full record is buffered, and keeps
//! partial state across calls. A malformed length prefix is a framing error,
//! not a silent skip: the file is written by exactly one writer, so a bad
//! prefix means corruption.
//!
//! ## Usage
//!
//! ```ignore
//! use buildlog_core::{encode_frame, Channel, FrameDecoder};
//! use bytes::BytesMut;
//!
//! let mut out = BytesMut::new();
//! encode_frame(Channel::Stdout, b"hello", &mut out);
//! assert_eq!(&out[..], b"6:0hello,");
//!
//! let mut decoder = FrameDecoder::new();
//! let chunks = decoder.feed(&out)?;
//! assert_eq!(chunks[0].payload.as_ref(), b"hello");
//! ```

use crate::chunk::{Channel, Chunk};
use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

/// Longest length prefix we accept, in digits.
///
/// Ten digits covers any record under 10 GB; anything longer is corruption.
const MAX_LENGTH_DIGITS: usize = 10;

/// Encode one record into `out`.
///
/// The payload may be empty; the record body then consists of just the
/// channel tag.
pub fn encode_frame(channel: Channel, payload: &[u8], out: &mut BytesMut) {
    let body_len = payload.len() + 1;
    out.reserve(encoded_len(payload.len()));
    out.put_slice(body_len.to_string().as_bytes());
    out.put_u8(b':');
    out.put_u8(channel.digit());
    out.put_slice(payload);
    out.put_u8(b',');
}

/// Total encoded size of a record with the given payload length.
pub fn encoded_len(payload_len: usize) -> usize {
    let body_len = payload_len + 1;
    decimal_digits(body_len as u64) + 1 + body_len + 1
}

fn decimal_digits(mut n: u64) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Streaming frame parser.
///
/// Feed it byte fragments in any sizes; it yields complete chunks and
/// retains partial state between calls. No side effects beyond its own
/// buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append incoming bytes without parsing.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Append incoming bytes and drain every complete record.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Chunk>> {
        self.push(data);
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_frame()? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Try to parse one record from the front of the buffer.
    ///
    /// Returns `Ok(None)` when the buffered bytes end mid-record; the
    /// partial record stays buffered for the next call.
    pub fn next_frame(&mut self) -> Result<Option<Chunk>> {
        // Length prefix: one or more decimal digits terminated by ':'.
        let mut body_len: u64 = 0;
        let mut prefix_len = 0;
        loop {
            if prefix_len >= self.buf.len() {
                return Ok(None);
            }
            match self.buf[prefix_len] {
                b'0'..=b'9' => {
                    if prefix_len == MAX_LENGTH_DIGITS {
                        return Err(Error::BadLengthPrefix(format!(
                            "length prefix longer than {} digits",
                            MAX_LENGTH_DIGITS
                        )));
                    }
                    body_len = body_len * 10 + u64::from(self.buf[prefix_len] - b'0');
                    prefix_len += 1;
                }
                b':' if prefix_len > 0 => break,
                other => {
                    return Err(Error::BadLengthPrefix(format!(
                        "unexpected byte 0x{:02x} at offset {}",
                        other, prefix_len
                    )));
                }
            }
        }
        if body_len == 0 {
            return Err(Error::EmptyRecord);
        }

        // Whole record buffered? prefix + ':' + body + ','.
        let record_len = prefix_len + 1 + body_len as usize + 1;
        if self.buf.len() < record_len {
            return Ok(None);
        }

        let tag = self.buf[prefix_len + 1];
        let channel = Channel::from_digit(tag).ok_or(Error::InvalidChannel(tag))?;
        let terminator = self.buf[record_len - 1];
        if terminator != b',' {
            return Err(Error::MissingTerminator(terminator));
        }

        let mut record = self.buf.split_to(record_len);
        // Drop prefix, ':' and channel tag; drop trailing ','.
        let _ = record.split_to(prefix_len + 2);
        record.truncate(body_len as usize - 1);

        Ok(Some(Chunk {
            channel,
            payload: record.freeze(),
        }))
    }

    /// True when no partial record is buffered.
    ///
    /// A reader that has consumed a well-formed file to its exact end must
    /// observe this.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes currently buffered (partial record).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
