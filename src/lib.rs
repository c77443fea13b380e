//! Streaming RAG ingestion and multi-signal retrieval.
//!
//! ragweld turns tabular document exports into an embedded, tenant-scoped
//! knowledge store and answers questions against it:
//!
//! ```text
//!   CSV / zip upload                          question
//!        │                                        │
//!        ▼                                        ▼
//!   chunking (normalize, segment,        retrieval (4 signals,
//!   SimHash near-dup filter)             reciprocal-rank fusion)
//!        │                                        │
//!        ▼                                        ▼
//!   pipeline (bounded queue,             context block assembly
//!   embedding worker pool,                        │
//!   progress events + heartbeats)                 ▼
//!        │                               generation (streamed
//!        ▼                               chat completion)
//!   stores (pgvector / in-memory) ◀──────────────┘
//! ```
//!
//! The seams are traits: [`embeddings::EmbeddingProvider`],
//! [`generation::GenerationClient`], and [`stores::DocumentStore`] each have
//! a production implementation and an offline one, so the whole flow runs in
//! tests without network or a database. [`service::RagService`] wires the
//! seams together behind the two operations most callers need.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ragweld::config::RagConfig;
//! use ragweld::chunking::IngestSource;
//! use ragweld::embeddings::{MockEmbeddingProvider, Tokenizer};
//! use ragweld::generation::MockGenerationClient;
//! use ragweld::service::RagService;
//! use ragweld::stores::MemoryDocumentStore;
//!
//! # async fn run() -> Result<(), ragweld::types::RagError> {
//! let service = RagService::new(
//!     Arc::new(MockEmbeddingProvider::default()),
//!     Arc::new(MockGenerationClient::new("grounded answer [1]")),
//!     Arc::new(MemoryDocumentStore::new()),
//!     Tokenizer::cl100k()?,
//!     RagConfig::from_env()?,
//! );
//!
//! let source = IngestSource::from_upload("export.csv", std::fs::read("export.csv").unwrap())?;
//! let job = service.ingest("tenant-a", source)?;
//! while let Ok(event) = job.events.recv_async().await {
//!     println!("{}", serde_json::to_string(&event).unwrap());
//! }
//! let report = job.wait().await?;
//! println!("{} chunks in {} batches", report.total_chunks, report.total_batches);
//!
//! let answer = service.answer("tenant-a", "what does the growth plan cost?").await?;
//! println!("{}", answer.collect().await?);
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod pipeline;
pub mod retrieval;
pub mod service;
pub mod stores;
pub mod types;

pub use config::RagConfig;
pub use pipeline::{IngestJob, ProgressEvent};
pub use service::RagService;
pub use types::{BatchFailure, Candidate, IngestReport, RagError};
