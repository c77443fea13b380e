//! Ordered progress events with heartbeat injection.
//!
//! The producer and every worker write to one internal channel; a forwarder
//! task drains it and relays each event to the caller-facing channel in
//! emission order. When no real event has been relayed within the
//! configured interval, a synthetic heartbeat is injected so long-lived
//! streaming connections survive intermediary idle timeouts. The stream is
//! append-only and terminal on `complete` or a fatal `error`.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// One phase notification from the ingestion pipeline.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Ingestion accepted; lists the files about to be processed.
    Starting { files: Vec<String> },
    /// Parser progress (schema detection, per-file notices).
    Parse { message: String },
    /// A row-batch finished chunking.
    Chunk { produced: usize },
    /// A worker began embedding a batch.
    Embed { batch: usize, count: usize },
    /// A worker persisted a batch.
    Insert { batch: usize, count: usize },
    /// A batch failed (`batch` set) or the whole run failed (`batch` empty).
    Error { batch: Option<usize>, message: String },
    /// Synthetic keep-alive; `ts` is a Unix timestamp.
    Heartbeat { ts: i64 },
    /// Terminal event: all workers exited. `failed_batches` is nonzero on
    /// partial failure.
    Complete {
        total_batches: usize,
        failed_batches: usize,
    },
}

impl ProgressEvent {
    /// `true` for events after which no further event will be emitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { batch: None, .. }
        )
    }
}

/// Cloneable handle the producer and workers emit through.
#[derive(Clone, Debug)]
pub struct ProgressSender {
    tx: flume::Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Emits one event. Errors are ignored: a closed channel means the
    /// caller went away, which cancellation handles separately.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Creates the internal event channel plus its sender handle.
pub fn progress_channel() -> (ProgressSender, flume::Receiver<ProgressEvent>) {
    let (tx, rx) = flume::unbounded();
    (ProgressSender { tx }, rx)
}

/// Drains the internal channel into the caller-facing channel, injecting
/// heartbeats during idle stretches. Returns once the internal channel is
/// closed and drained. If the caller drops their receiver, the cancel flag
/// flips so the producer and workers can stop at the next batch boundary.
pub(crate) async fn forward_with_heartbeats(
    internal: flume::Receiver<ProgressEvent>,
    out: flume::Sender<ProgressEvent>,
    heartbeat: Duration,
    cancel: watch::Sender<bool>,
) {
    let poll = heartbeat.min(Duration::from_secs(1)).max(Duration::from_millis(10));
    let mut last_sent = tokio::time::Instant::now();

    loop {
        match tokio::time::timeout(poll, internal.recv_async()).await {
            Ok(Ok(event)) => {
                if out.send_async(event).await.is_err() {
                    let _ = cancel.send(true);
                    return;
                }
                last_sent = tokio::time::Instant::now();
            }
            // Channel closed and drained: production is over.
            Ok(Err(_)) => return,
            Err(_) => {
                if last_sent.elapsed() >= heartbeat {
                    let event = ProgressEvent::Heartbeat {
                        ts: Utc::now().timestamp(),
                    };
                    if out.send_async(event).await.is_err() {
                        let _ = cancel.send(true);
                        return;
                    }
                    last_sent = tokio::time::Instant::now();
                }
            }
        }
    }
}
