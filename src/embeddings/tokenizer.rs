//! Token counting with the embedding model's own encoder.
//!
//! Batch budgets are enforced with the same `cl100k_base` encoding the
//! embedding service tokenizes with, so assembled batches never exceed the
//! service's hard request limits.

use std::fmt;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::types::RagError;

/// Shared handle to a byte-pair encoder. Cheap to clone; constructed once
/// per service and injected wherever token counts are needed.
#[derive(Clone)]
pub struct Tokenizer {
    bpe: Arc<CoreBPE>,
}

impl Tokenizer {
    /// Builds the `cl100k_base` encoder used by the embedding models.
    pub fn cl100k() -> Result<Self, RagError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|err| RagError::Tokenizer(err.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Number of tokens in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Truncates `text` to at most `max_tokens` tokens, decoding back to a
    /// valid string. Text already within the cap is returned unchanged.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_with_special_tokens(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        match self.bpe.decode(tokens[..max_tokens].to_vec()) {
            Ok(decoded) => decoded,
            // Token boundaries can split a multi-byte character; fall back
            // to a conservative character cut.
            Err(_) => text.chars().take(max_tokens * 4).collect(),
        }
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer").field("encoding", &"cl100k_base").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_positive_for_non_empty_text() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        assert_eq!(tokenizer.count(""), 0);
        assert!(tokenizer.count("hello world") >= 2);
    }

    #[test]
    fn truncate_is_identity_within_cap() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        let text = "short text stays untouched";
        assert_eq!(tokenizer.truncate(text, 1000), text);
    }

    #[test]
    fn truncate_enforces_token_cap() {
        let tokenizer = Tokenizer::cl100k().unwrap();
        let long: String = std::iter::repeat("alpha beta gamma ").take(200).collect();
        let truncated = tokenizer.truncate(&long, 50);
        assert!(tokenizer.count(&truncated) <= 50);
        assert!(truncated.len() < long.len());
    }
}
