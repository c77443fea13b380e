//! Streaming ingestion pipeline: producer, bounded queue, worker pool.
//!
//! ```text
//!   IngestSource ──▶ ChunkProducer ──▶ BatchAssembler
//!                        │ (row batches)     │ (closed batches)
//!                        ▼                   ▼
//!                  progress events    flume::bounded(2·W)
//!                        │                   │
//!                        │          ┌────────┼────────┐
//!                        │          ▼        ▼        ▼
//!                        │       worker   worker   worker
//!                        │       embed ─▶ insert  (W total)
//!                        ▼          │
//!                  forwarder ◀──────┘  heartbeats injected when idle
//!                        │
//!                        ▼
//!                  IngestJob::events
//! ```
//!
//! The queue is bounded at twice the worker count, so the producer blocks
//! instead of materializing the whole document when embedding is the
//! bottleneck. Workers own their batches exclusively; a failed batch is
//! recorded and the run continues, so one bad batch never sinks the rest.
//! Closing the queue is the shutdown signal: workers exit when the producer
//! is done and the queue drains.

pub mod progress;

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chunking::{ChunkProducer, IngestSource, SchemaKind};
use crate::config::RagConfig;
use crate::embeddings::{Batch, BatchAssembler, EmbeddingProvider, Tokenizer, prepare_rows};
use crate::stores::DocumentStore;
use crate::types::{BatchFailure, IngestReport, RagError};

pub use progress::{ProgressEvent, ProgressSender, progress_channel};

/// A running ingestion: an ordered event stream plus the awaitable outcome.
///
/// Dropping `events` cancels the run at the next batch boundary; work
/// already persisted stays persisted.
pub struct IngestJob {
    /// Ordered progress events, heartbeats included. Terminal on
    /// [`ProgressEvent::Complete`] or a fatal [`ProgressEvent::Error`].
    pub events: flume::Receiver<ProgressEvent>,
    handle: JoinHandle<Result<IngestReport, RagError>>,
}

impl IngestJob {
    /// Waits for the run to finish. Full success yields the report; any
    /// failed batch yields [`RagError::PartialFailure`] carrying it.
    pub async fn wait(self) -> Result<IngestReport, RagError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(RagError::Internal(err.to_string())),
        }
    }
}

/// Starts an ingestion run for `tenant`.
///
/// Input classification errors (unsupported extension, empty archive,
/// unreadable zip) surface here, before any task is spawned. Everything
/// later is reported through the event stream and the job outcome.
pub fn spawn_ingest(
    tenant: impl Into<String>,
    source: IngestSource,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    tokenizer: Tokenizer,
    config: RagConfig,
) -> Result<IngestJob, RagError> {
    let files = source.into_files()?;
    let tenant = tenant.into();

    let (sender, internal) = progress_channel();
    let (out_tx, out_rx) = flume::unbounded();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let forwarder = tokio::spawn(progress::forward_with_heartbeats(
        internal,
        out_tx,
        config.pipeline.heartbeat,
        cancel_tx,
    ));

    let handle = tokio::spawn(run_pipeline(
        tenant, files, provider, store, tokenizer, config, sender, cancel_rx, forwarder,
    ));

    Ok(IngestJob {
        events: out_rx,
        handle,
    })
}

#[allow(clippy::too_many_arguments)]
async fn run_pipeline(
    tenant: String,
    files: Vec<(String, Vec<u8>)>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    tokenizer: Tokenizer,
    config: RagConfig,
    sender: ProgressSender,
    cancel: watch::Receiver<bool>,
    forwarder: JoinHandle<()>,
) -> Result<IngestReport, RagError> {
    sender.emit(ProgressEvent::Starting {
        files: files.iter().map(|(name, _)| name.clone()).collect(),
    });

    let (queue_tx, queue_rx) = flume::bounded::<(usize, Batch)>(config.pipeline.queue_capacity());
    let failures: Arc<Mutex<Vec<BatchFailure>>> = Arc::new(Mutex::new(Vec::new()));
    let tenant = Arc::<str>::from(tenant);

    let mut workers = Vec::with_capacity(config.pipeline.embed_concurrency.max(1));
    for _ in 0..config.pipeline.embed_concurrency.max(1) {
        workers.push(tokio::spawn(run_worker(
            queue_rx.clone(),
            Arc::clone(&tenant),
            Arc::clone(&provider),
            Arc::clone(&store),
            sender.clone(),
            cancel.clone(),
            Arc::clone(&failures),
        )));
    }
    drop(queue_rx);

    let producer = ChunkProducer::new(
        config.chunking.clone(),
        config.dedupe,
        config.pipeline.rows_per_read,
    );
    let mut assembler = BatchAssembler::new(config.batch, tokenizer.clone());
    let mut next_batch = 0usize;
    let mut total_chunks = 0usize;
    let mut fatal: Option<RagError> = None;

    'files: for (name, bytes) in files {
        if *cancel.borrow() {
            break;
        }
        let mut stream = match producer.open(&bytes) {
            Ok(stream) => stream,
            Err(err) => {
                fatal = Some(err);
                break;
            }
        };
        let schema = match stream.schema() {
            SchemaKind::Structured => "structured crawl export",
            SchemaKind::Generic => "generic rows",
        };
        sender.emit(ProgressEvent::Parse {
            message: format!("{name}: {schema}"),
        });

        while let Some(result) = stream.next_chunks() {
            if *cancel.borrow() {
                break 'files;
            }
            let chunks = match result {
                Ok(chunks) => chunks,
                Err(err) => {
                    fatal = Some(err);
                    break 'files;
                }
            };
            let produced = chunks.len();
            total_chunks += produced;
            for chunk in chunks {
                let chunk = tokenizer.truncate(&chunk, config.batch.max_tokens_per_item);
                if let Some(batch) = assembler.push(chunk) {
                    if queue_tx.send_async((next_batch, batch)).await.is_err() {
                        break 'files;
                    }
                    next_batch += 1;
                }
            }
            sender.emit(ProgressEvent::Chunk { produced });
        }
    }

    if fatal.is_none() && !*cancel.borrow() {
        if let Some(batch) = assembler.finish() {
            if queue_tx.send_async((next_batch, batch)).await.is_ok() {
                next_batch += 1;
            }
        }
    }
    // Closing the queue tells the workers to drain and exit.
    drop(queue_tx);
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::warn!(error = %err, "embedding worker panicked");
        }
    }

    let failures = match Arc::try_unwrap(failures) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
        Err(shared) => shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect(),
    };

    let outcome = match fatal {
        Some(err) => {
            tracing::warn!(error = %err, "ingestion aborted");
            sender.emit(ProgressEvent::Error {
                batch: None,
                message: err.to_string(),
            });
            Err(err)
        }
        None => {
            sender.emit(ProgressEvent::Complete {
                total_batches: next_batch,
                failed_batches: failures.len(),
            });
            IngestReport {
                total_batches: next_batch,
                total_chunks,
                failures,
            }
            .into_result()
        }
    };

    // Let the forwarder flush everything before the job resolves.
    drop(sender);
    if let Err(err) = forwarder.await {
        tracing::warn!(error = %err, "progress forwarder panicked");
    }
    outcome
}

async fn run_worker(
    queue: flume::Receiver<(usize, Batch)>,
    tenant: Arc<str>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    sender: ProgressSender,
    cancel: watch::Receiver<bool>,
    failures: Arc<Mutex<Vec<BatchFailure>>>,
) {
    while let Ok((index, batch)) = queue.recv_async().await {
        if *cancel.borrow() {
            continue;
        }
        sender.emit(ProgressEvent::Embed {
            batch: index,
            count: batch.len(),
        });
        match embed_and_insert(&tenant, &batch, provider.as_ref(), store.as_ref()).await {
            Ok(()) => sender.emit(ProgressEvent::Insert {
                batch: index,
                count: batch.len(),
            }),
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(batch = index, error = %message, "batch failed");
                sender.emit(ProgressEvent::Error {
                    batch: Some(index),
                    message: message.clone(),
                });
                failures
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(BatchFailure {
                        batch: index,
                        message,
                    });
            }
        }
    }
}

async fn embed_and_insert(
    tenant: &str,
    batch: &Batch,
    provider: &dyn EmbeddingProvider,
    store: &dyn DocumentStore,
) -> Result<(), RagError> {
    let vectors = provider.embed_batch(&batch.chunks).await?;
    store.insert_rows(tenant, &batch.chunks, &vectors).await
}

/// Embeds and persists pre-chunked rows without the streaming machinery.
///
/// Rows are trimmed, exact-deduplicated, and truncated before batching;
/// batches run with the configured concurrency and partial failures are
/// accumulated under the same contract as [`spawn_ingest`].
pub async fn embed_and_store(
    tenant: &str,
    rows: Vec<String>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    tokenizer: &Tokenizer,
    config: &RagConfig,
) -> Result<IngestReport, RagError> {
    use futures_util::StreamExt;

    let prepared = prepare_rows(rows, tokenizer, config.batch.max_tokens_per_item);
    let mut assembler = BatchAssembler::new(config.batch, tokenizer.clone());
    let mut batches = Vec::new();
    for row in prepared {
        if let Some(batch) = assembler.push(row) {
            batches.push(batch);
        }
    }
    if let Some(batch) = assembler.finish() {
        batches.push(batch);
    }

    let total_batches = batches.len();
    let total_chunks = batches.iter().map(Batch::len).sum();
    let results: Vec<Option<BatchFailure>> = futures_util::stream::iter(
        batches.into_iter().enumerate().map(|(index, batch)| {
            let provider = Arc::clone(&provider);
            let store = Arc::clone(&store);
            async move {
                match embed_and_insert(tenant, &batch, provider.as_ref(), store.as_ref()).await {
                    Ok(()) => None,
                    Err(err) => Some(BatchFailure {
                        batch: index,
                        message: err.to_string(),
                    }),
                }
            }
        }),
    )
    .buffer_unordered(config.pipeline.embed_concurrency.max(1))
    .collect()
    .await;

    let mut failures: Vec<BatchFailure> = results.into_iter().flatten().collect();
    failures.sort_by_key(|f| f.batch);
    IngestReport {
        total_batches,
        total_chunks,
        failures,
    }
    .into_result()
}
