//! Core types shared across the ragweld pipeline.
//!
//! This module defines the crate-wide error taxonomy ([`RagError`]), the
//! retrieval candidate record, and the typed ingestion report used by both
//! the streaming pipeline and the standalone embed-and-store path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the ingestion and retrieval paths.
///
/// The taxonomy mirrors how failures are surfaced to callers:
///
/// - input errors (`InvalidEncoding`, `UnsupportedFile`, `MissingInput`)
///   abort before any work starts;
/// - `MalformedInput` covers parse failures in accepted inputs, including
///   mid-stream row errors;
/// - service errors (`Embedding`, `Generation`, `Fetch`) are opaque messages
///   from external collaborators;
/// - `Storage` covers connection and write failures;
/// - `PartialFailure` is the aggregate signal for an ingestion run where some
///   batches failed while others were persisted.
#[derive(Debug, Error)]
pub enum RagError {
    /// The uploaded bytes were not valid UTF-8. Raised before any chunk is
    /// emitted.
    #[error("input must be UTF-8 encoded text")]
    InvalidEncoding,

    /// The uploaded file is neither a recognized tabular file nor an archive
    /// of them.
    #[error("unsupported file type: {name}")]
    UnsupportedFile { name: String },

    /// Neither a file nor a fetchable URL was provided.
    #[error("no file or URL provided")]
    MissingInput,

    /// An archive was provided but contained no qualifying tabular files.
    #[error("archive contains no CSV files")]
    EmptyArchive,

    /// The input was accepted by type but failed to parse: a corrupt
    /// archive, an unreadable entry, or a malformed row mid-stream.
    #[error("malformed input: {message}")]
    MalformedInput { message: String },

    /// Fetching a remote source failed.
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The embedding service rejected or failed a request.
    #[error("embedding service error: {0}")]
    Embedding(String),

    /// The generation service rejected or failed a request.
    #[error("generation service error: {0}")]
    Generation(String),

    /// A storage connection or query failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An inserted vector did not match the store's configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The token encoder could not be constructed.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal task panicked or was aborted.
    #[error("ingestion task failed: {0}")]
    Internal(String),

    /// Some embedding batches failed while others were persisted. The report
    /// carries one entry per failed batch.
    #[error("{} of {} batches failed", report.failures.len(), report.total_batches)]
    PartialFailure { report: IngestReport },
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Storage(err.to_string())
    }
}

/// A single failed embedding batch: which batch, and the service or storage
/// message that sank it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchFailure {
    /// Zero-based index of the batch in emission order.
    pub batch: usize,
    /// Opaque error message from the embedding service or the store.
    pub message: String,
}

/// Aggregate outcome of one ingestion run.
///
/// Successful batches are already persisted by the time the report is
/// produced; `failures` lists the batches that were not.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Total number of batches handed to the worker pool.
    pub total_batches: usize,
    /// Total number of chunks across all batches.
    pub total_chunks: usize,
    /// Per-batch failures, in the order workers observed them.
    pub failures: Vec<BatchFailure>,
}

impl IngestReport {
    /// `true` when every batch embedded and persisted successfully.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts the report into a result: `Ok` on full success,
    /// `Err(RagError::PartialFailure)` otherwise.
    pub fn into_result(self) -> Result<IngestReport, RagError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(RagError::PartialFailure { report: self })
        }
    }
}

/// A stored row surfaced by one retrieval signal.
///
/// Identity is the persisted row id: the same id returned by several signals
/// refers to the same row, regardless of content equality.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Persisted row id.
    pub id: i64,
    /// Stored chunk text.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_report_converts_to_ok() {
        let report = IngestReport {
            total_batches: 3,
            total_chunks: 12,
            failures: vec![],
        };
        assert!(report.is_complete());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn failed_report_converts_to_partial_failure() {
        let report = IngestReport {
            total_batches: 3,
            total_chunks: 12,
            failures: vec![BatchFailure {
                batch: 1,
                message: "boom".into(),
            }],
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, RagError::PartialFailure { .. }));
        assert_eq!(err.to_string(), "1 of 3 batches failed");
    }
}
