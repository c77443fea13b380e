//! Greedy batch packing under item-count and token-budget caps.

use crate::config::BatchConfig;
use crate::embeddings::tokenizer::Tokenizer;

/// An ordered group of chunks bounded by the embedding service's request
/// limits. Owned exclusively by one worker once enqueued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    /// Chunk texts in production order.
    pub chunks: Vec<String>,
    /// Summed token count over `chunks`.
    pub tokens: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Packs chunks greedily: a chunk joins the current batch unless doing so
/// would exceed either cap, in which case the current batch closes and the
/// chunk starts the next one. A single chunk over the token budget still
/// forms its own batch rather than being dropped.
#[derive(Debug)]
pub struct BatchAssembler {
    config: BatchConfig,
    tokenizer: Tokenizer,
    current: Vec<String>,
    current_tokens: usize,
}

impl BatchAssembler {
    pub fn new(config: BatchConfig, tokenizer: Tokenizer) -> Self {
        Self {
            config,
            tokenizer,
            current: Vec::new(),
            current_tokens: 0,
        }
    }

    /// Adds one chunk, returning a closed batch when the chunk did not fit
    /// in the current one.
    pub fn push(&mut self, chunk: String) -> Option<Batch> {
        let tokens = self.tokenizer.count(&chunk);
        let closed = if !self.current.is_empty()
            && (self.current_tokens + tokens > self.config.max_tokens
                || self.current.len() >= self.config.max_items)
        {
            Some(self.take_current())
        } else {
            None
        };
        self.current.push(chunk);
        self.current_tokens += tokens;
        closed
    }

    /// Closes and returns the in-progress batch, if any.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.take_current())
        }
    }

    fn take_current(&mut self) -> Batch {
        Batch {
            chunks: std::mem::take(&mut self.current),
            tokens: std::mem::replace(&mut self.current_tokens, 0),
        }
    }
}
