//! Configuration for the ingestion pipeline and retrieval engine.
//!
//! Every tuning knob has a compiled default matching production-safe values;
//! [`RagConfig::from_env`] layers environment overrides on top (prefix
//! `RAGWELD_`, with `OPENAI_API_KEY` and `DATABASE_URL` read directly by the
//! service constructors). A `.env` file is honored via `dotenvy`.

use std::time::Duration;

use crate::types::RagError;

/// Default boilerplate substrings stripped by the normalizer. Lines whose
/// lowercased text contains any of these are dropped outright.
pub const DEFAULT_BOILERPLATE: &[&str] = &[
    "cookie",
    "privacy policy",
    "subscribe",
    "site navigation",
    "newsletter",
    "all rights reserved",
    "related posts",
    "breadcrumbs",
    "follow us",
    "linkedin",
    "twitter",
    "instagram",
    "facebook",
    "careers",
    "\u{a9}",
    "terms of",
];

/// Knobs for section segmentation and micro-chunk extraction.
#[derive(Clone, Debug)]
pub struct ChunkingConfig {
    /// Minimum characters for a bullet line to become a micro-chunk.
    pub min_micro_bullet: usize,
    /// Minimum characters for a table row to become a micro-chunk.
    pub min_table_row: usize,
    /// Minimum characters for a paragraph window to be kept.
    pub min_para: usize,
    /// Word-window size for paragraph chunking.
    pub window: usize,
    /// Word overlap between consecutive windows.
    pub overlap: usize,
    /// Cap on bullet micro-chunks per section.
    pub max_bullets_per_section: usize,
    /// Cap on table-row micro-chunks per section.
    pub max_table_rows_per_section: usize,
    /// Boilerplate substrings removed line-wise by the normalizer.
    pub boilerplate: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_micro_bullet: 30,
            min_table_row: 20,
            min_para: 60,
            window: 320,
            overlap: 24,
            max_bullets_per_section: 12,
            max_table_rows_per_section: 20,
            boilerplate: DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Knobs for the near-duplicate filter.
#[derive(Clone, Copy, Debug)]
pub struct DedupeConfig {
    /// Maximum Hamming distance (of 64 bits) at which a chunk counts as a
    /// near-duplicate and is dropped.
    pub hamming_threshold: u32,
    /// Number of recent fingerprints retained for comparison.
    pub lookback: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: 5,
            lookback: 1500,
        }
    }
}

/// Batch caps for the embedding service. Both limits are per request.
#[derive(Clone, Copy, Debug)]
pub struct BatchConfig {
    /// Maximum chunks per embedding request.
    pub max_items: usize,
    /// Maximum summed token count per embedding request.
    pub max_tokens: usize,
    /// Per-chunk token cap; longer chunks are truncated before batching.
    pub max_tokens_per_item: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_items: 128,
            // Stays under the 300k request ceiling with headroom.
            max_tokens: 240_000,
            max_tokens_per_item: 8_000,
        }
    }
}

/// Concurrency and streaming knobs for the ingestion pipeline.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Number of concurrent embedding workers.
    pub embed_concurrency: usize,
    /// CSV rows read per producer iteration.
    pub rows_per_read: usize,
    /// Idle interval after which a heartbeat event is injected.
    pub heartbeat: Duration,
}

impl PipelineConfig {
    /// Capacity of the bounded batch queue. Twice the worker count keeps
    /// every worker fed while still applying backpressure to the producer.
    pub fn queue_capacity(&self) -> usize {
        (self.embed_concurrency * 2).max(1)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embed_concurrency: 3,
            rows_per_read: 400,
            heartbeat: Duration::from_secs(15),
        }
    }
}

/// Per-signal caps and fusion constants for retrieval.
#[derive(Clone, Copy, Debug)]
pub struct RetrievalConfig {
    /// Candidates pulled by the lexical-similarity signal.
    pub lexical_limit: usize,
    /// Candidates pulled by the dense vector signal.
    pub vector_limit: usize,
    /// Candidates pulled by each substring signal.
    pub substring_limit: usize,
    /// Reciprocal-rank constant; larger values flatten rank influence.
    pub rrf_k: f64,
    /// Distinct candidates returned after fusion.
    pub top_n: usize,
    /// Character budget for the assembled context block.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_limit: 15,
            vector_limit: 15,
            substring_limit: 20,
            rrf_k: 40.0,
            top_n: 12,
            max_context_chars: 25_000,
        }
    }
}

/// Model selection for the answer path.
#[derive(Clone, Debug)]
pub struct AnswerConfig {
    /// Generation model identifier.
    pub model: String,
    /// Sampling temperature for answers.
    pub temperature: f64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.5,
        }
    }
}

/// Embedding model selection and the configured vector dimensionality.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    /// Embedding model identifier.
    pub model: String,
    /// Fixed vector dimensionality; every stored row must match.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }
}

/// Top-level configuration bundle, one per service instance.
#[derive(Clone, Debug, Default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub dedupe: DedupeConfig,
    pub batch: BatchConfig,
    pub pipeline: PipelineConfig,
    pub retrieval: RetrievalConfig,
    pub answer: AnswerConfig,
    pub embedding: EmbeddingConfig,
}

impl RagConfig {
    /// Loads configuration with environment overrides applied on top of the
    /// compiled defaults. A `.env` file is loaded first when present.
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();

        let mut cfg = Self::default();
        if let Some(v) = parse_env::<usize>("RAGWELD_EMBED_CONCURRENCY")? {
            cfg.pipeline.embed_concurrency = v.max(1);
        }
        if let Some(v) = parse_env::<usize>("RAGWELD_MAX_ITEMS_PER_BATCH")? {
            cfg.batch.max_items = v.max(1);
        }
        if let Some(v) = parse_env::<usize>("RAGWELD_MAX_TOKENS_PER_BATCH")? {
            cfg.batch.max_tokens = v;
        }
        if let Some(v) = parse_env::<usize>("RAGWELD_MAX_TOKENS_PER_ITEM")? {
            cfg.batch.max_tokens_per_item = v;
        }
        if let Some(v) = parse_env::<usize>("RAGWELD_MAX_CONTEXT_CHARS")? {
            cfg.retrieval.max_context_chars = v;
        }
        if let Some(v) = parse_env::<usize>("RAGWELD_EMBED_DIM")? {
            cfg.embedding.dimension = v;
        }
        if let Some(v) = parse_env::<u64>("RAGWELD_HEARTBEAT_SECS")? {
            cfg.pipeline.heartbeat = Duration::from_secs(v);
        }
        if let Ok(model) = std::env::var("RAGWELD_EMBED_MODEL") {
            cfg.embedding.model = model;
        }
        if let Ok(model) = std::env::var("RAGWELD_ANSWER_MODEL") {
            cfg.answer.model = model;
        }
        if let Some(v) = parse_env::<f64>("RAGWELD_ANSWER_TEMPERATURE")? {
            cfg.answer.temperature = v;
        }
        Ok(cfg)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, RagError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            RagError::Config(format!("{key} has an invalid value: '{raw}'"))
        }),
        Err(_) => Ok(None),
    }
}
