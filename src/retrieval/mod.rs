//! Multi-signal retrieval with reciprocal-rank fusion.
//!
//! Four ranked candidate lists are pulled concurrently for every question:
//!
//! 1. lexical similarity against the raw question,
//! 2. dense vector distance against the question embedding,
//! 3. case-insensitive substring match on the raw question,
//! 4. substring match on a normalized question variant with punctuation
//!    stripped, so `"what's the price?"` still hits rows containing
//!    `"the price"`.
//!
//! The lists are fused by reciprocal rank: each candidate scores
//! `1/(k + rank)` per list it appears in, summed across lists. A failed
//! signal degrades to an empty list instead of failing the question, so
//! retrieval keeps working when e.g. the trigram extension is missing.

pub mod context;

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::config::RetrievalConfig;
use crate::embeddings::{EmbeddingProvider, embed_question};
use crate::stores::DocumentStore;
use crate::types::{Candidate, RagError};

pub use context::build_context;

static NON_SEARCHABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-zA-Z %$]").expect("searchable pattern"));

/// Strips characters that defeat substring matching, keeping digits,
/// letters, `%`, and `$`, then collapses runs of whitespace.
pub fn normalize_question(question: &str) -> String {
    let stripped = NON_SEARCHABLE.replace_all(question, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sums reciprocal-rank scores across the signal lists and returns distinct
/// candidates, best first. Ranks are 1-based within each list. Ties keep
/// first-seen order across lists, which makes fusion deterministic for a
/// fixed list ordering.
pub fn fuse_signals(signals: &[Vec<Candidate>], rrf_k: f64, top_n: usize) -> Vec<Candidate> {
    let mut scores: FxHashMap<i64, f64> = FxHashMap::default();
    let mut order: Vec<Candidate> = Vec::new();

    for list in signals {
        for (rank, candidate) in list.iter().enumerate() {
            let score = 1.0 / (rrf_k + (rank + 1) as f64);
            if let Some(existing) = scores.get_mut(&candidate.id) {
                *existing += score;
            } else {
                scores.insert(candidate.id, score);
                order.push(candidate.clone());
            }
        }
    }

    order.sort_by(|a, b| {
        let sa = scores.get(&a.id).copied().unwrap_or(0.0);
        let sb = scores.get(&b.id).copied().unwrap_or(0.0);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(top_n);
    order
}

fn signal_or_empty(name: &str, result: Result<Vec<Candidate>, RagError>) -> Vec<Candidate> {
    match result {
        Ok(candidates) => candidates,
        Err(err) => {
            tracing::warn!(signal = name, error = %err, "retrieval signal failed");
            Vec::new()
        }
    }
}

/// Retrieves the fused top candidates for `question` within `tenant`.
///
/// The question embedding is fetched first; its failure is the only fatal
/// path, since the dense signal would otherwise silently disappear on every
/// provider outage. The four store signals then run concurrently.
pub async fn retrieve(
    store: &dyn DocumentStore,
    provider: &dyn EmbeddingProvider,
    tenant: &str,
    question: &str,
    config: &RetrievalConfig,
) -> Result<Vec<Candidate>, RagError> {
    let embedding = embed_question(provider, question).await?;
    let normalized = normalize_question(question);

    let (lexical, dense, raw_substring, normalized_substring) = tokio::join!(
        store.lexical_search(tenant, question, config.lexical_limit),
        store.vector_search(tenant, &embedding, config.vector_limit),
        store.substring_search(tenant, question, config.substring_limit),
        async {
            // Always issued, even when normalization is a no-op: a row
            // ranked by both substring lists earns both contributions.
            if normalized.is_empty() {
                Ok(Vec::new())
            } else {
                store
                    .substring_search(tenant, &normalized, config.substring_limit)
                    .await
            }
        },
    );

    let signals = vec![
        signal_or_empty("lexical", lexical),
        signal_or_empty("vector", dense),
        signal_or_empty("substring", raw_substring),
        signal_or_empty("substring_normalized", normalized_substring),
    ];
    Ok(fuse_signals(&signals, config.rrf_k, config.top_n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::stores::MemoryDocumentStore;

    fn candidate(id: i64, content: &str) -> Candidate {
        Candidate {
            id,
            content: content.to_string(),
        }
    }

    #[test]
    fn normalization_strips_punctuation_and_keeps_money_marks() {
        assert_eq!(
            normalize_question("What's the price, in $USD (per month)?"),
            "What s the price in $USD per month"
        );
        assert_eq!(normalize_question("20% discount?"), "20% discount");
        assert_eq!(normalize_question("???"), "");
    }

    #[test]
    fn candidates_in_multiple_signals_outrank_single_signal_hits() {
        let signals = vec![
            vec![candidate(1, "one"), candidate(2, "two")],
            vec![candidate(2, "two"), candidate(3, "three")],
        ];
        let fused = fuse_signals(&signals, 40.0, 10);
        assert_eq!(fused[0].id, 2, "id 2 appears in both lists");
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let signals = vec![
            vec![candidate(5, "first seen")],
            vec![candidate(9, "second seen")],
        ];
        let fused = fuse_signals(&signals, 40.0, 10);
        assert_eq!(fused[0].id, 5);
        assert_eq!(fused[1].id, 9);
    }

    #[test]
    fn fusion_respects_top_n() {
        let signals = vec![(1..=20).map(|i| candidate(i, "row")).collect::<Vec<_>>()];
        let fused = fuse_signals(&signals, 40.0, 12);
        assert_eq!(fused.len(), 12);
    }

    #[test]
    fn duplicate_ids_across_signals_appear_once() {
        let signals = vec![
            vec![candidate(1, "same row")],
            vec![candidate(1, "same row")],
            vec![candidate(1, "same row")],
        ];
        let fused = fuse_signals(&signals, 40.0, 10);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].content, "same row");
    }

    #[tokio::test]
    async fn retrieve_finds_rows_across_signals() {
        let store = MemoryDocumentStore::new();
        let provider = MockEmbeddingProvider::default();
        let texts = vec![
            "The growth plan costs $50 per month and includes fifty seats".to_string(),
            "Support is available by email around the clock".to_string(),
            "Totally unrelated content about gardening".to_string(),
        ];
        let vectors = provider.embed_batch(&texts).await.unwrap();
        store.insert_rows("acme", &texts, &vectors).await.unwrap();

        let fused = retrieve(
            &store,
            &provider,
            "acme",
            "What does the growth plan cost?",
            &RetrievalConfig::default(),
        )
        .await
        .unwrap();

        assert!(!fused.is_empty());
        // The growth row scores in both the lexical and vector lists; the
        // gardening row can only appear in the vector list, so it can never
        // outrank the growth row.
        let position = |needle: &str| fused.iter().position(|c| c.content.contains(needle));
        let growth = position("growth plan").expect("growth row retrieved");
        if let Some(gardening) = position("gardening") {
            assert!(growth < gardening);
        }
    }

    #[tokio::test]
    async fn both_substring_signals_run_for_plain_questions() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use async_trait::async_trait;

        struct CountingStore {
            inner: MemoryDocumentStore,
            substring_calls: AtomicUsize,
        }

        #[async_trait]
        impl DocumentStore for CountingStore {
            async fn insert_rows(
                &self,
                tenant: &str,
                texts: &[String],
                vectors: &[Vec<f32>],
            ) -> Result<(), RagError> {
                self.inner.insert_rows(tenant, texts, vectors).await
            }

            async fn lexical_search(
                &self,
                tenant: &str,
                query: &str,
                limit: usize,
            ) -> Result<Vec<Candidate>, RagError> {
                self.inner.lexical_search(tenant, query, limit).await
            }

            async fn vector_search(
                &self,
                tenant: &str,
                embedding: &[f32],
                limit: usize,
            ) -> Result<Vec<Candidate>, RagError> {
                self.inner.vector_search(tenant, embedding, limit).await
            }

            async fn substring_search(
                &self,
                tenant: &str,
                needle: &str,
                limit: usize,
            ) -> Result<Vec<Candidate>, RagError> {
                self.substring_calls.fetch_add(1, Ordering::SeqCst);
                self.inner.substring_search(tenant, needle, limit).await
            }
        }

        let store = CountingStore {
            inner: MemoryDocumentStore::new(),
            substring_calls: AtomicUsize::new(0),
        };
        let provider = MockEmbeddingProvider::default();
        let texts = vec!["what is the monthly price of the growth plan".to_string()];
        let vectors = provider.embed_batch(&texts).await.unwrap();
        store.insert_rows("acme", &texts, &vectors).await.unwrap();

        // Normalization is a no-op for a plain alphanumeric question; the
        // variant query still runs, so a row matched by both substring
        // lists earns two reciprocal-rank contributions.
        let question = "what is the monthly price";
        assert_eq!(normalize_question(question), question);
        let fused = retrieve(
            &store,
            &provider,
            "acme",
            question,
            &RetrievalConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(store.substring_calls.load(Ordering::SeqCst), 2);
        assert_eq!(fused.len(), 1);
    }

    #[tokio::test]
    async fn retrieve_is_tenant_scoped() {
        let store = MemoryDocumentStore::new();
        let provider = MockEmbeddingProvider::default();
        let texts = vec!["pricing details live here".to_string()];
        let vectors = provider.embed_batch(&texts).await.unwrap();
        store.insert_rows("other", &texts, &vectors).await.unwrap();

        let fused = retrieve(
            &store,
            &provider,
            "acme",
            "pricing details",
            &RetrievalConfig::default(),
        )
        .await
        .unwrap();
        assert!(fused.is_empty());
    }
}
