//! Log Streaming Sessions
//!
//! This module implements the per-consumer streaming session: replay what is
//! already on disk, then hand off to live push delivery without loss or
//! duplication.
//!
//! ## Session Lifecycle
//!
//! ```text
//! CATCHUP ──────────────→ LIVE ──────────────→ DONE
//!   read disk in            forward pushed       on_finished,
//!   bounded blocks,         chunks as the        unregister
//!   decode, deliver         writer appends
//!
//!   PAUSED is orthogonal: while paused, neither the disk-read loop
//!   advances nor are live chunks forwarded.
//! ```
//!
//! ## The Handoff
//!
//! When the disk read reaches EOF, the session registers itself as a live
//! subscriber *before* reading the store's open-run contents, all under one
//! lock acquisition (`register_with_snapshot`). Any chunk written in the gap
//! between "EOF on disk" and "snapshot the run" is therefore either still in
//! the run (delivered via the snapshot) or pushed to the already-registered
//! live queue (delivered live) - never both, never neither. The session then
//! drains the disk up to exactly the snapshot's flushed length, delivers the
//! run snapshot, and switches to the live queue.
//!
//! ## Backpressure and Cancellation
//!
//! Delivery is driven one chunk at a time against the consumer; the live
//! queue is bounded, so a slow or paused consumer eventually blocks the
//! writer's live push (flow control) rather than buffering without bound.
//! `detach` aborts the session task at any point in any state: the queue
//! receiver drops, the store prunes the dead subscriber on its next push,
//! and no further calls into the consumer occur. Detaching twice is a no-op.

use crate::error::Result;
use crate::logfile::{LogEvent, LogFile};
use async_trait::async_trait;
use buildlog_core::{ChannelSet, Chunk, FrameDecoder};
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Receiver half of a streaming session.
///
/// Implementations are driven by the session task; after `on_finished` (or
/// a detach) no further calls are made.
#[async_trait]
pub trait LogConsumer: Send + 'static {
    async fn on_chunk(&mut self, chunk: Chunk);
    async fn on_finished(&mut self);
}

/// Handle to a running streaming session.
///
/// Dropping the handle detaches the session.
pub struct StreamSession {
    task: Option<tokio::task::JoinHandle<()>>,
    paused: watch::Sender<bool>,
}

impl StreamSession {
    /// Suspend delivery. Chunks are not lost; they stay queued (and the
    /// writer is eventually backpressured) until `resume`.
    pub fn pause(&self) {
        let _ = self.paused.send(true);
    }

    /// Resume delivery.
    pub fn resume(&self) {
        let _ = self.paused.send(false);
    }

    /// Stop the session immediately. Idempotent.
    pub fn detach(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Wait for the session to deliver everything and finish.
    pub async fn wait(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Start a streaming session: full catch-up from disk, then live delivery.
pub fn subscribe_consumer<C: LogConsumer>(
    log: Arc<LogFile>,
    consumer: C,
    filter: ChannelSet,
) -> StreamSession {
    let (paused_tx, paused_rx) = watch::channel(false);
    let task = tokio::spawn(run_session(log, consumer, filter, paused_rx));
    StreamSession {
        task: Some(task),
        paused: paused_tx,
    }
}

async fn run_session<C: LogConsumer>(
    log: Arc<LogFile>,
    mut consumer: C,
    filter: ChannelSet,
    mut paused: watch::Receiver<bool>,
) {
    if let Err(e) = drive(&log, &mut consumer, filter, &mut paused).await {
        warn!(log = %log.name(), error = %e, "log streaming session failed");
    }
}

async fn drive<C: LogConsumer>(
    log: &Arc<LogFile>,
    consumer: &mut C,
    filter: ChannelSet,
    paused: &mut watch::Receiver<bool>,
) -> Result<()> {
    let block_size = log.config().read_block_size.max(1);

    // CATCHUP. The write handle appends while we read; an open fd stays
    // valid even if compression later replaces the path.
    let mut file = match File::open(log.path()).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Already finished and compressed: replay the full snapshot.
            return replay_snapshot_and_finish(log, consumer, filter, paused).await;
        }
        Err(e) => return Err(e.into()),
    };

    let mut decoder = FrameDecoder::new();
    let mut pos: u64 = 0;
    let mut buf = vec![0u8; block_size];

    let registration = loop {
        wait_unpaused(paused).await;
        let n = file.read(&mut buf).await?;
        if n == 0 {
            // EOF: register-then-snapshot, atomically.
            break log.register_with_snapshot().await;
        }
        pos += n as u64;
        for chunk in decoder.feed(&buf[..n])? {
            deliver(consumer, filter, paused, chunk).await;
        }
    };

    // Drain frames flushed between our EOF and the registration, stopping
    // exactly at the snapshot's cut-off.
    let snapshot = registration.snapshot;
    while pos < snapshot.disk_len {
        let take = ((snapshot.disk_len - pos) as usize).min(block_size);
        let mut tail = vec![0u8; take];
        file.read_exact(&mut tail).await?;
        pos += take as u64;
        for chunk in decoder.feed(&tail)? {
            deliver(consumer, filter, paused, chunk).await;
        }
    }

    // The open-run snapshot: registration happened strictly before this was
    // captured, so nothing here is re-delivered by the live queue.
    if let Some(run) = snapshot.run {
        deliver(consumer, filter, paused, run).await;
    }

    let Some(mut live) = registration.live else {
        // Finished at registration time; everything is on disk and drained.
        consumer.on_finished().await;
        return Ok(());
    };

    debug!(log = %log.name(), caught_up_bytes = pos, "log streamer live");

    // LIVE.
    loop {
        match live.recv().await {
            Some(LogEvent::Chunk(chunk)) => deliver(consumer, filter, paused, chunk).await,
            Some(LogEvent::Finished) | None => {
                consumer.on_finished().await;
                return Ok(());
            }
        }
    }
}

/// Catch-up path for a log that finished and was compressed before the
/// session opened it.
async fn replay_snapshot_and_finish<C: LogConsumer>(
    log: &Arc<LogFile>,
    consumer: &mut C,
    filter: ChannelSet,
    paused: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut reader = log.read_chunks(filter).await?;
    while let Some(chunk) = reader.next_chunk().await? {
        wait_unpaused(paused).await;
        consumer.on_chunk(chunk).await;
    }
    consumer.on_finished().await;
    Ok(())
}

async fn deliver<C: LogConsumer>(
    consumer: &mut C,
    filter: ChannelSet,
    paused: &mut watch::Receiver<bool>,
    chunk: Chunk,
) {
    wait_unpaused(paused).await;
    if filter.contains(chunk.channel) {
        consumer.on_chunk(chunk).await;
    }
}

async fn wait_unpaused(paused: &mut watch::Receiver<bool>) {
    // Err means the session handle is gone; the task is being torn down
    // anyway, so delivery may proceed.
    let _ = paused.wait_for(|p| !*p).await;
}
