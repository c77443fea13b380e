//! Document-to-chunk processing: cleanup, segmentation, duplicate
//! suppression, and streaming production from tabular uploads.
//!
//! ```text
//! raw CSV / zip bytes
//!        │
//!        ▼
//! producer::ChunkProducer ──► normalize::Normalizer (NFKC, boilerplate)
//!        │                        │
//!        │                        ▼
//!        │                 segment::Segmenter (sections, bullets,
//!        │                        │            tables, word windows)
//!        │                        ▼
//!        └────────────► dedupe::NearDuplicateFilter (SimHash window)
//!                                 │
//!                                 ▼
//!                        normalized chunk batches
//! ```

pub mod dedupe;
pub mod normalize;
pub mod producer;
pub mod segment;

pub use dedupe::{NearDuplicateFilter, simhash64};
pub use normalize::{Normalizer, normalize_numbers};
pub use producer::{ChunkProducer, ChunkStream, IngestSource, SchemaKind, fetch_source};
pub use segment::{Provenance, Section, Segmenter, split_sections};
