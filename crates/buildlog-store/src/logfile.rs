//! Chunked Log Store
//!
//! This module implements the append-only, channel-tagged log store backing
//! one build step log.
//!
//! ## Write Path
//!
//! ```text
//! Build step ─→ add_stdout/add_stderr/add_header
//!                     │
//!                     ▼
//!              ┌─────────────┐   channel switch / finish
//!              │  open run   │ ─────────────────────────→ frames on disk
//!              │ (one chan)  │        (frame codec)
//!              └─────────────┘
//!                     │ every accepted chunk, synchronously
//!                     ▼
//!              live subscriber queues (bounded, backpressured)
//! ```
//!
//! Consecutive same-channel writes accumulate in the open run; a channel
//! switch flushes the run as one or more frames of at most `chunk_size`
//! payload bytes. Every accepted chunk is also pushed to all live
//! subscriber queues while the state lock is held, which is what makes live
//! delivery possible without re-reading disk.
//!
//! ## Snapshot Reads
//!
//! `read_chunks` captures the flushed byte length and the open-run contents
//! atomically, then reads frames from offset 0 up to exactly that length.
//! The captured length is the explicit write-sequence cut-off: writes that
//! land after the call are never visible to that reader, and calling again
//! produces a fresh, independent snapshot. Readers try the compressed
//! variant before the plain file.
//!
//! ## Truncation
//!
//! `log_max_size` caps body (non-header) output. The chunk that crosses the
//! cap is sliced; everything past the cap is discarded and announced once
//! via a HEADER chunk. With `log_max_tail_size` configured, discarded bytes
//! are instead retained in a bounded trailing ring that is written out when
//! the log finishes. Live subscribers simply stop receiving dropped body
//! bytes; they are not retroactively notified.
//!
//! ## Lifecycle
//!
//! `finish` flushes everything (tail ring first, if any), syncs and closes
//! the write handle, delivers a terminal event to every subscriber, resolves
//! the completion signal, and kicks off best-effort compression in the
//! background. Appending to a finished log is a contract violation (panic).

use crate::compress;
use crate::config::{CompressMethod, LogConfig};
use crate::error::Result;
use crate::signal::Completion;
use buildlog_core::{encode_frame, Channel, ChannelSet, Chunk, FrameDecoder};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Event delivered to live subscribers.
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// A chunk accepted by the write path.
    Chunk(Chunk),
    /// The log finished; no further events follow.
    Finished,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    tx: mpsc::Sender<LogEvent>,
}

/// Point-in-time view captured under the state lock.
#[derive(Debug, Clone)]
pub(crate) struct ReadSnapshot {
    pub(crate) disk_len: u64,
    pub(crate) run: Option<Chunk>,
    pub(crate) compressed: bool,
}

/// Result of a streamer's atomic register-then-snapshot handoff.
pub(crate) struct HandoffRegistration {
    pub(crate) snapshot: ReadSnapshot,
    /// None when the log already finished at registration time.
    pub(crate) live: Option<mpsc::Receiver<LogEvent>>,
}

#[derive(Debug)]
struct LogState {
    file: Option<File>,
    /// Framed bytes flushed to disk.
    disk_len: u64,
    /// Open run: consecutive same-channel payload bytes awaiting flush.
    run: BytesMut,
    run_channel: Channel,
    /// Accepted body (non-header) payload bytes.
    body_len: u64,
    finished: bool,
    max_size_exceeded: bool,
    dropped_bytes: u64,
    /// Bounded ring of trailing discarded entries.
    tail: VecDeque<Chunk>,
    tail_len: usize,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    /// The plain file has been replaced by a compressed variant.
    compressed: bool,
    compress_task: Option<tokio::task::JoinHandle<()>>,
}

impl LogState {
    fn snapshot(&self) -> ReadSnapshot {
        let run = if self.run.is_empty() {
            None
        } else {
            Some(Chunk::new(
                self.run_channel,
                Bytes::copy_from_slice(&self.run),
            ))
        };
        ReadSnapshot {
            disk_len: self.disk_len,
            run,
            compressed: self.compressed,
        }
    }

    /// Flush the open run as frames. The run is cleared exactly here; the
    /// streamer handoff relies on that.
    async fn flush_run(&mut self, config: &LogConfig) -> Result<()> {
        if self.run.is_empty() {
            return Ok(());
        }
        let channel = self.run_channel;
        let payload = self.run.split().freeze();
        self.write_frames(channel, &payload, config).await
    }

    /// Frame and write a payload directly, splitting at `chunk_size`.
    async fn write_frames(
        &mut self,
        channel: Channel,
        payload: &[u8],
        config: &LogConfig,
    ) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "log write handle closed")
        })?;

        let mut buf = BytesMut::new();
        for slice in payload.chunks(config.chunk_size) {
            encode_frame(channel, slice, &mut buf);
        }
        file.write_all(&buf).await?;
        self.disk_len += buf.len() as u64;
        Ok(())
    }

    /// Push a chunk to every live subscriber, pruning dead ones.
    ///
    /// Bounded queues: a full queue blocks the writer until the subscriber
    /// drains it (flow control on the live path).
    async fn push_live(&mut self, chunk: &Chunk) {
        if self.subscribers.is_empty() {
            return;
        }
        let mut dead = Vec::new();
        for sub in &self.subscribers {
            if sub.tx.send(LogEvent::Chunk(chunk.clone())).await.is_err() {
                dead.push(sub.id);
            }
        }
        if !dead.is_empty() {
            self.subscribers.retain(|s| !dead.contains(&s.id));
        }
    }

    /// Retain discarded bytes in the bounded trailing ring.
    fn stash_tail(&mut self, config: &LogConfig, channel: Channel, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.dropped_bytes += data.len() as u64;
        let Some(cap) = config.log_max_tail_size else {
            return;
        };
        if cap == 0 {
            return;
        }
        if data.len() >= cap {
            // This chunk alone fills the ring; keep only its tail.
            self.tail.clear();
            let start = data.len() - cap;
            self.tail.push_back(Chunk::new(channel, data.slice(start..)));
            self.tail_len = cap;
            return;
        }
        self.tail_len += data.len();
        self.tail.push_back(Chunk::new(channel, data));
        while self.tail_len > cap {
            let excess = self.tail_len - cap;
            match self.tail.front_mut() {
                Some(front) if front.payload.len() <= excess => {
                    self.tail_len -= front.payload.len();
                    self.tail.pop_front();
                }
                Some(front) => {
                    front.payload = front.payload.slice(excess..);
                    self.tail_len -= excess;
                }
                None => break,
            }
        }
    }
}

/// Append-only, channel-tagged log store for one build step log.
///
/// Exactly one writer (the owning step) appends; arbitrarily many readers
/// take snapshots or stream live.
#[derive(Debug)]
pub struct LogFile {
    name: String,
    path: PathBuf,
    config: LogConfig,
    state: Arc<Mutex<LogState>>,
    finished: Completion<()>,
}

impl LogFile {
    /// Create a fresh log at `path`.
    pub async fn create(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        config: LogConfig,
    ) -> Result<Self> {
        let name = name.into();
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;

        debug!(log = %name, path = ?path, "log created");

        Ok(Self {
            name,
            path,
            config,
            state: Arc::new(Mutex::new(LogState {
                file: Some(file),
                disk_len: 0,
                run: BytesMut::new(),
                run_channel: Channel::Stdout,
                body_len: 0,
                finished: false,
                max_size_exceeded: false,
                dropped_bytes: 0,
                tail: VecDeque::new(),
                tail_len: 0,
                subscribers: Vec::new(),
                next_subscriber_id: 0,
                compressed: false,
                compress_task: None,
            })),
            finished: Completion::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub async fn add_stdout(&self, data: impl Into<Bytes>) -> Result<()> {
        self.add_chunk(Channel::Stdout, data.into()).await
    }

    pub async fn add_stderr(&self, data: impl Into<Bytes>) -> Result<()> {
        self.add_chunk(Channel::Stderr, data.into()).await
    }

    pub async fn add_header(&self, data: impl Into<Bytes>) -> Result<()> {
        self.add_chunk(Channel::Header, data.into()).await
    }

    /// Append one chunk.
    ///
    /// # Panics
    ///
    /// Panics if the log already finished - that is a bug in the calling
    /// component, not an operational failure.
    pub async fn add_chunk(&self, channel: Channel, payload: Bytes) -> Result<()> {
        let mut state = self.state.lock().await;
        assert!(
            !state.finished,
            "chunk appended to finished log {:?}",
            self.name
        );
        if payload.is_empty() {
            return Ok(());
        }

        let mut accepted = payload;
        if channel.is_body() {
            if let Some(max) = self.config.log_max_size {
                if state.max_size_exceeded {
                    state.stash_tail(&self.config, channel, accepted);
                    return Ok(());
                }
                let remaining = max.saturating_sub(state.body_len);
                if accepted.len() as u64 > remaining {
                    let overflow = accepted.split_off(remaining as usize);
                    if !accepted.is_empty() {
                        self.append_accepted(&mut state, channel, accepted).await?;
                    }
                    state.max_size_exceeded = true;
                    state.stash_tail(&self.config, channel, overflow);

                    // One-shot truncation announcement, flushed immediately.
                    let marker = format!(
                        "\nOutput exceeded {} bytes, remaining output has been discarded\n",
                        max
                    );
                    state.flush_run(&self.config).await?;
                    state
                        .write_frames(Channel::Header, marker.as_bytes(), &self.config)
                        .await?;
                    let header = Chunk::header(marker);
                    state.push_live(&header).await;

                    warn!(log = %self.name, max_bytes = max, "log output truncated");
                    return Ok(());
                }
            }
        }

        self.append_accepted(&mut state, channel, accepted).await
    }

    async fn append_accepted(
        &self,
        state: &mut LogState,
        channel: Channel,
        payload: Bytes,
    ) -> Result<()> {
        if !state.run.is_empty() && state.run_channel != channel {
            state.flush_run(&self.config).await?;
        }
        state.run_channel = channel;
        state.run.extend_from_slice(&payload);
        if channel.is_body() {
            state.body_len += payload.len() as u64;
        }
        let chunk = Chunk::new(channel, payload);
        state.push_live(&chunk).await;
        Ok(())
    }

    /// Finish the log: flush everything, close the write handle, detach
    /// subscribers, resolve the completion signal, and kick off best-effort
    /// compression. Calling twice is a no-op.
    pub async fn finish(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.finished {
            return Ok(());
        }

        if !state.tail.is_empty() {
            // Separate passes: announcement header, retained tail, open run.
            let marker = format!(
                "\nFinal {} bytes of discarded output follow:\n",
                state.tail_len
            );
            state
                .write_frames(Channel::Header, marker.as_bytes(), &self.config)
                .await?;
            let tail = std::mem::take(&mut state.tail);
            state.tail_len = 0;
            for entry in tail {
                state
                    .write_frames(entry.channel, &entry.payload, &self.config)
                    .await?;
            }
        }
        state.flush_run(&self.config).await?;

        if let Some(file) = state.file.as_mut() {
            file.flush().await?;
            file.sync_data().await?;
        }
        state.file = None;
        state.finished = true;

        let subscribers = std::mem::take(&mut state.subscribers);
        for sub in subscribers {
            let _ = sub.tx.send(LogEvent::Finished).await;
        }

        if let Some(compress_config) = &self.config.compress {
            if state.disk_len >= compress_config.min_size {
                let method = compress_config.method;
                let path = self.path.clone();
                let name = self.name.clone();
                let shared = self.state.clone();
                state.compress_task = Some(tokio::spawn(async move {
                    match compress::compress_file(&path, method).await {
                        Ok(compressed) => {
                            shared.lock().await.compressed = true;
                            debug!(log = %name, path = ?compressed, "log compressed");
                        }
                        Err(e) => {
                            warn!(
                                log = %name,
                                error = %e,
                                "log compression failed, keeping plain file"
                            );
                        }
                    }
                }));
            }
        }

        info!(
            log = %self.name,
            flushed_bytes = state.disk_len,
            body_bytes = state.body_len,
            dropped_bytes = state.dropped_bytes,
            "log finished"
        );
        drop(state);

        self.finished.resolve(());
        Ok(())
    }

    /// Wait until `finish` has run.
    pub async fn wait_until_finished(&self) {
        self.finished.wait().await
    }

    /// The log's completion signal.
    pub fn finish_signal(&self) -> &Completion<()> {
        &self.finished
    }

    pub async fn is_finished(&self) -> bool {
        self.state.lock().await.finished
    }

    /// Accepted body (non-header) payload bytes.
    pub async fn body_length(&self) -> u64 {
        self.state.lock().await.body_len
    }

    /// Framed bytes flushed to disk so far.
    pub async fn flushed_length(&self) -> u64 {
        self.state.lock().await.disk_len
    }

    /// Whether the body cap was hit.
    pub async fn max_size_exceeded(&self) -> bool {
        self.state.lock().await.max_size_exceeded
    }

    /// Wait for any background compression kicked off by `finish`.
    ///
    /// Compression is best-effort and never blocks completion; this exists
    /// so callers (and tests) can observe its outcome deterministically.
    pub async fn compression_done(&self) {
        let task = self.state.lock().await.compress_task.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Subscribe to live chunks only (no catch-up).
    ///
    /// On an already-finished log the subscription yields just the terminal
    /// event.
    pub async fn subscribe(&self) -> LiveSubscription {
        let mut state = self.state.lock().await;
        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        if state.finished {
            let _ = tx.try_send(LogEvent::Finished);
        } else {
            let id = state.next_subscriber_id;
            state.next_subscriber_id += 1;
            state.subscribers.push(Subscriber { id, tx });
        }
        LiveSubscription { rx }
    }

    /// Atomic register-then-snapshot used by the streamer handoff.
    ///
    /// The live queue is registered strictly before the run snapshot is
    /// taken, so anything in the snapshot is excluded from subsequent live
    /// pushes and anything after it arrives live: no gap, no duplicate.
    pub(crate) async fn register_with_snapshot(&self) -> HandoffRegistration {
        let mut state = self.state.lock().await;
        if state.finished {
            return HandoffRegistration {
                snapshot: state.snapshot(),
                live: None,
            };
        }
        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.push(Subscriber { id, tx });
        HandoffRegistration {
            snapshot: state.snapshot(),
            live: Some(rx),
        }
    }

    /// Consistent point-in-time read of everything written so far.
    ///
    /// Captures the flushed length and open-run contents at call time; the
    /// returned reader never sees later writes. Calling again produces a
    /// fresh snapshot including newer data.
    pub async fn read_chunks(&self, filter: ChannelSet) -> Result<ChunkReader> {
        let snapshot = self.state.lock().await.snapshot();
        ChunkReader::open(
            &self.path,
            self.config.compress.as_ref().map(|c| c.method),
            snapshot,
            filter,
            self.config.read_block_size,
        )
        .await
    }

    /// Concatenated stdout + stderr text.
    ///
    /// Idempotent once the log is finished: repeated calls return the same
    /// value.
    pub async fn get_text(&self) -> Result<String> {
        self.read_text(ChannelSet::body()).await
    }

    /// Concatenated text of all channels, headers included.
    pub async fn get_text_with_headers(&self) -> Result<String> {
        self.read_text(ChannelSet::all()).await
    }

    async fn read_text(&self, filter: ChannelSet) -> Result<String> {
        let mut reader = self.read_chunks(filter).await?;
        let mut out = Vec::new();
        while let Some(chunk) = reader.next_chunk().await? {
            out.extend_from_slice(&chunk.payload);
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// A live-only subscription handle.
pub struct LiveSubscription {
    rx: mpsc::Receiver<LogEvent>,
}

impl LiveSubscription {
    /// Next live event; `None` after the channel is torn down.
    pub async fn next_event(&mut self) -> Option<LogEvent> {
        self.rx.recv().await
    }
}

enum ReadSource {
    File(File),
    Memory { data: Bytes, pos: usize },
    Empty,
}

/// Finite pull-style reader over one snapshot of a log.
pub struct ChunkReader {
    source: ReadSource,
    /// Framed bytes still to read; the snapshot cut-off.
    remaining: u64,
    decoder: FrameDecoder,
    pending: VecDeque<Chunk>,
    run: Option<Chunk>,
    filter: ChannelSet,
    block_size: usize,
}

impl ChunkReader {
    async fn open(
        path: &Path,
        compress_method: Option<CompressMethod>,
        snapshot: ReadSnapshot,
        filter: ChannelSet,
        block_size: usize,
    ) -> Result<Self> {
        let source = if snapshot.disk_len == 0 {
            ReadSource::Empty
        } else if snapshot.compressed {
            let method = compress_method.unwrap_or(CompressMethod::Gzip);
            let data =
                compress::read_compressed(&compress::compressed_path(path, method), method).await?;
            ReadSource::Memory { data, pos: 0 }
        } else {
            match File::open(path).await {
                Ok(file) => ReadSource::File(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    // The log finished and was compressed between the
                    // snapshot and this open; fall back to the variant.
                    let method = compress_method.unwrap_or(CompressMethod::Gzip);
                    let data = compress::read_compressed(
                        &compress::compressed_path(path, method),
                        method,
                    )
                    .await?;
                    ReadSource::Memory { data, pos: 0 }
                }
                Err(e) => return Err(e.into()),
            }
        };

        Ok(Self {
            source,
            remaining: snapshot.disk_len,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            run: snapshot.run,
            filter,
            block_size: block_size.max(1),
        })
    }

    /// Next chunk passing the filter, or `None` at the end of the snapshot.
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                if self.filter.contains(chunk.channel) {
                    return Ok(Some(chunk));
                }
                continue;
            }

            if self.remaining == 0 {
                if let Some(run) = self.run.take() {
                    if self.filter.contains(run.channel) {
                        return Ok(Some(run));
                    }
                    continue;
                }
                return Ok(None);
            }

            let take = (self.remaining as usize).min(self.block_size);
            let block = match &mut self.source {
                ReadSource::File(file) => {
                    let mut buf = vec![0u8; take];
                    file.read_exact(&mut buf).await?;
                    Bytes::from(buf)
                }
                ReadSource::Memory { data, pos } => {
                    let block = data.slice(*pos..*pos + take);
                    *pos += take;
                    block
                }
                ReadSource::Empty => Bytes::new(),
            };
            self.remaining -= take as u64;
            for chunk in self.decoder.feed(&block)? {
                self.pending.push_back(chunk);
            }
        }
    }

    /// Drain the remainder of the snapshot into a vector.
    pub async fn collect(mut self) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn new_log(config: LogConfig) -> (LogFile, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = LogFile::create("stdio", temp_dir.path().join("1-compile-stdio"), config)
            .await
            .unwrap();
        (log, temp_dir)
    }

    #[tokio::test]
    async fn test_text_reassembly_in_write_order() {
        let (log, _dir) = new_log(LogConfig::default()).await;

        log.add_stdout("hello ").await.unwrap();
        log.add_stdout("world").await.unwrap();
        log.add_stderr("!").await.unwrap();
        log.add_header("[build info]").await.unwrap();
        log.add_stdout(" done").await.unwrap();
        log.finish().await.unwrap();

        assert_eq!(log.get_text().await.unwrap(), "hello world! done");
        assert_eq!(
            log.get_text_with_headers().await.unwrap(),
            "hello world![build info] done"
        );
        // Idempotent once finished.
        assert_eq!(log.get_text().await.unwrap(), "hello world! done");
    }

    #[tokio::test]
    async fn test_snapshot_excludes_later_writes() {
        let (log, _dir) = new_log(LogConfig::default()).await;

        log.add_stdout("before").await.unwrap();
        let reader = log.read_chunks(ChannelSet::all()).await.unwrap();

        log.add_stdout(" after").await.unwrap();

        let first: Vec<u8> = reader
            .collect()
            .await
            .unwrap()
            .iter()
            .flat_map(|c| c.payload.to_vec())
            .collect();
        assert_eq!(first, b"before");

        // A fresh snapshot sees everything, exactly once.
        let second: Vec<u8> = log
            .read_chunks(ChannelSet::all())
            .await
            .unwrap()
            .collect()
            .await
            .unwrap()
            .iter()
            .flat_map(|c| c.payload.to_vec())
            .collect();
        assert_eq!(second, b"before after");

        log.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_switch_flushes_run() {
        let (log, _dir) = new_log(LogConfig::default()).await;

        log.add_stdout("out1").await.unwrap();
        log.add_stdout("out2").await.unwrap();
        assert_eq!(log.flushed_length().await, 0, "same channel stays in run");

        log.add_stderr("err").await.unwrap();
        assert!(log.flushed_length().await > 0, "channel switch flushes");

        log.finish().await.unwrap();
        let chunks = log
            .read_chunks(ChannelSet::all())
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        // Adjacent same-channel writes merged at the flush boundary.
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].payload, Bytes::from("out1out2"));
        assert_eq!(chunks[0].channel, Channel::Stdout);
        assert_eq!(chunks[1].payload, Bytes::from("err"));
    }

    #[tokio::test]
    async fn test_run_split_into_capped_frames() {
        let config = LogConfig {
            chunk_size: 8,
            ..Default::default()
        };
        let (log, _dir) = new_log(config).await;

        log.add_stdout("0123456789abcdef01").await.unwrap();
        log.finish().await.unwrap();

        let chunks = log
            .read_chunks(ChannelSet::all())
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].payload.len(), 8);
        assert_eq!(chunks[1].payload.len(), 8);
        assert_eq!(chunks[2].payload.len(), 2);
        let text = log.get_text().await.unwrap();
        assert_eq!(text, "0123456789abcdef01");
    }

    #[tokio::test]
    async fn test_channel_filter() {
        let (log, _dir) = new_log(LogConfig::default()).await;

        log.add_header("hdr").await.unwrap();
        log.add_stdout("out").await.unwrap();
        log.add_stderr("err").await.unwrap();
        log.finish().await.unwrap();

        let only_err = log
            .read_chunks(ChannelSet::of(&[Channel::Stderr]))
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(only_err.len(), 1);
        assert_eq!(only_err[0].payload, Bytes::from("err"));
    }

    #[tokio::test]
    async fn test_unfinished_snapshot_includes_open_run() {
        let (log, _dir) = new_log(LogConfig::default()).await;

        log.add_stdout("in the run").await.unwrap();
        let chunks = log
            .read_chunks(ChannelSet::all())
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].payload, Bytes::from("in the run"));
        log.finish().await.unwrap();
    }

    #[tokio::test]
    async fn test_truncation_emits_single_header() {
        let config = LogConfig {
            log_max_size: Some(10),
            ..Default::default()
        };
        let (log, _dir) = new_log(config).await;

        log.add_stdout("0123456789ABCDEF").await.unwrap();
        log.add_stdout("more dropped output").await.unwrap();
        log.add_header("headers still accepted").await.unwrap();
        log.finish().await.unwrap();

        assert!(log.max_size_exceeded().await);
        assert_eq!(log.get_text().await.unwrap(), "0123456789");

        let with_headers = log.get_text_with_headers().await.unwrap();
        assert_eq!(
            with_headers.matches("remaining output has been discarded").count(),
            1
        );
        assert!(with_headers.contains("headers still accepted"));
    }

    #[tokio::test]
    async fn test_truncation_tail_written_on_finish() {
        let config = LogConfig {
            log_max_size: Some(4),
            log_max_tail_size: Some(6),
            ..Default::default()
        };
        let (log, _dir) = new_log(config).await;

        log.add_stdout("abcd").await.unwrap();
        log.add_stdout("EFGHIJKLMNOP").await.unwrap();
        log.finish().await.unwrap();

        // Body capped at 4 bytes; ring keeps the final 6 dropped bytes.
        assert_eq!(log.get_text().await.unwrap(), "abcdKLMNOP");
        let with_headers = log.get_text_with_headers().await.unwrap();
        assert!(with_headers.contains("Final 6 bytes of discarded output follow"));
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let (log, _dir) = new_log(LogConfig::default()).await;
        log.add_stdout("x").await.unwrap();
        log.finish().await.unwrap();
        log.finish().await.unwrap();
        assert!(log.is_finished().await);
    }

    #[tokio::test]
    #[should_panic(expected = "appended to finished log")]
    async fn test_add_after_finish_panics() {
        let (log, _dir) = new_log(LogConfig::default()).await;
        log.finish().await.unwrap();
        let _ = log.add_stdout("too late").await;
    }

    #[tokio::test]
    async fn test_wait_until_finished() {
        let (log, _dir) = new_log(LogConfig::default()).await;
        let log = Arc::new(log);

        let waiter = tokio::spawn({
            let log = log.clone();
            async move { log.wait_until_finished().await }
        });
        tokio::task::yield_now().await;

        log.add_stdout("x").await.unwrap();
        log.finish().await.unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_live_subscription_sees_writes_then_finish() {
        let (log, _dir) = new_log(LogConfig::default()).await;

        let mut sub = log.subscribe().await;
        log.add_stdout("live").await.unwrap();
        log.finish().await.unwrap();

        match sub.next_event().await {
            Some(LogEvent::Chunk(chunk)) => assert_eq!(chunk.payload, Bytes::from("live")),
            other => panic!("expected chunk, got {:?}", other),
        }
        assert!(matches!(sub.next_event().await, Some(LogEvent::Finished)));
    }

    #[tokio::test]
    async fn test_subscribe_after_finish_yields_terminal_event() {
        let (log, _dir) = new_log(LogConfig::default()).await;
        log.finish().await.unwrap();

        let mut sub = log.subscribe().await;
        assert!(matches!(sub.next_event().await, Some(LogEvent::Finished)));
    }

    #[tokio::test]
    async fn test_compressed_log_read_back() {
        let config = LogConfig {
            compress: Some(crate::config::CompressConfig {
                method: CompressMethod::Gzip,
                min_size: 1,
            }),
            ..Default::default()
        };
        let (log, _dir) = new_log(config).await;

        let line = "a line of compressible output\n".repeat(200);
        log.add_stdout(line.clone()).await.unwrap();
        log.finish().await.unwrap();
        log.compression_done().await;

        assert!(!log.path().exists(), "plain file replaced");
        assert!(compress::compressed_path(log.path(), CompressMethod::Gzip).exists());
        assert_eq!(log.get_text().await.unwrap(), line);
    }
}
