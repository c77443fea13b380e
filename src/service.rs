//! Top-level facade wiring ingestion, retrieval, and generation together.
//!
//! [`RagService`] owns the injected collaborators (embedding provider,
//! generation client, document store, tokenizer) plus the configuration
//! bundle, and exposes the two operations callers care about: start an
//! ingestion run and answer a question grounded in stored context.

use std::sync::Arc;

use crate::chunking::IngestSource;
use crate::config::RagConfig;
use crate::embeddings::{EmbeddingProvider, Tokenizer};
use crate::generation::{AnswerStream, ChatMessage, GenerationClient};
use crate::pipeline::{self, IngestJob};
use crate::retrieval::{self, build_context};
use crate::stores::DocumentStore;
use crate::types::{IngestReport, RagError};

const NO_CONTEXT_ANSWER: &str = "I don’t know. No relevant context found.";

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer concisely using ONLY the \
     provided context snippets. If the answer is not in the context, say you don't know. \
     Include no made-up facts.";

/// One service instance: collaborators plus configuration, cheap to clone
/// into handlers.
#[derive(Clone)]
pub struct RagService {
    provider: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationClient>,
    store: Arc<dyn DocumentStore>,
    tokenizer: Tokenizer,
    config: RagConfig,
}

impl RagService {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationClient>,
        store: Arc<dyn DocumentStore>,
        tokenizer: Tokenizer,
        config: RagConfig,
    ) -> Self {
        Self {
            provider,
            generator,
            store,
            tokenizer,
            config,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Starts a streaming ingestion run for `tenant` over `source`.
    pub fn ingest(&self, tenant: &str, source: IngestSource) -> Result<IngestJob, RagError> {
        pipeline::spawn_ingest(
            tenant,
            source,
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            self.tokenizer.clone(),
            self.config.clone(),
        )
    }

    /// Embeds and persists pre-chunked rows for `tenant` without the
    /// streaming pipeline.
    pub async fn embed_rows(&self, tenant: &str, rows: Vec<String>) -> Result<IngestReport, RagError> {
        pipeline::embed_and_store(
            tenant,
            rows,
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            &self.tokenizer,
            &self.config,
        )
        .await
    }

    /// Answers `question` from `tenant`'s stored documents, streaming the
    /// answer text. With no retrieved context the stream carries a fixed
    /// refusal instead of calling the generation model.
    pub async fn answer(&self, tenant: &str, question: &str) -> Result<AnswerStream, RagError> {
        let candidates = retrieval::retrieve(
            self.store.as_ref(),
            self.provider.as_ref(),
            tenant,
            question,
            &self.config.retrieval,
        )
        .await?;

        if candidates.is_empty() {
            let (tx, rx) = flume::unbounded();
            let _ = tx.send(Ok(NO_CONTEXT_ANSWER.to_string()));
            return Ok(AnswerStream::from_channel(rx));
        }

        let context = build_context(&candidates, self.config.retrieval.max_context_chars);
        let user = format!(
            "Tenant: {tenant}\n\
             Question: {question}\n\n\
             Context snippets:\n{context}\n\
             Instructions:\n\
             - Cite snippets by their bracketed numbers, e.g., [1], [2].\n\
             - Keep the answer to 10-15 sentences unless asked otherwise."
        );
        self.generator
            .stream_chat(vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(user),
            ])
            .await
    }
}
