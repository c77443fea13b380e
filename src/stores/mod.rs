//! Tenant-partitioned document storage.
//!
//! The [`DocumentStore`] trait abstracts the append-only store the pipeline
//! writes to and the retrieval engine queries, so the engine can run against
//! Postgres/pgvector in production and [`MemoryDocumentStore`] in tests:
//!
//! ```text
//!                ┌────────────────────┐
//!                │  DocumentStore     │
//!                │  insert + 3 search │
//!                │  signals           │
//!                └─────────┬──────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!     ┌─────────────────┐     ┌─────────────────┐
//!     │ PgDocumentStore │     │ MemoryDocument  │
//!     │ pgvector + trgm │     │ Store (tests)   │
//!     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Every stored row belongs to exactly one tenant, and vectors share one
//! configured dimensionality across all rows.

pub mod postgres;

use async_trait::async_trait;

use crate::types::{Candidate, RagError};

pub use postgres::PgDocumentStore;

/// Append-only, tenant-partitioned storage with three ranked search signals.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Bulk-inserts `(tenant, text, vector)` rows. Implementations must
    /// serialize writes; callers may invoke this concurrently.
    async fn insert_rows(
        &self,
        tenant: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), RagError>;

    /// Rows ranked by lexical similarity of stored text to `query`.
    async fn lexical_search(
        &self,
        tenant: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError>;

    /// Rows ranked by vector distance to `embedding`, nearest first.
    async fn vector_search(
        &self,
        tenant: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError>;

    /// Rows whose text contains `needle`, case-insensitively.
    async fn substring_search(
        &self,
        tenant: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError>;
}

/// In-memory store used by tests and examples. Search signals approximate
/// the Postgres behavior: word-overlap ranking for lexical search and
/// Euclidean distance for vector search.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    rows: std::sync::Mutex<Vec<MemoryRow>>,
}

#[derive(Clone, Debug)]
struct MemoryRow {
    id: i64,
    tenant: String,
    content: String,
    vector: Vec<f32>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `tenant`.
    pub fn count(&self, tenant: &str) -> usize {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.tenant == tenant)
            .count()
    }

    fn tenant_rows(&self, tenant: &str) -> Vec<MemoryRow> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.tenant == tenant)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_rows(
        &self,
        tenant: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), RagError> {
        if texts.len() != vectors.len() {
            return Err(RagError::Storage(format!(
                "{} texts but {} vectors",
                texts.len(),
                vectors.len()
            )));
        }
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let mut next_id = rows.len() as i64 + 1;
        for (text, vector) in texts.iter().zip(vectors) {
            rows.push(MemoryRow {
                id: next_id,
                tenant: tenant.to_string(),
                content: text.clone(),
                vector: vector.clone(),
            });
            next_id += 1;
        }
        Ok(())
    }

    async fn lexical_search(
        &self,
        tenant: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let mut scored: Vec<(usize, MemoryRow)> = self
            .tenant_rows(tenant)
            .into_iter()
            .map(|row| {
                let content = row.content.to_lowercase();
                let overlap = query_words.iter().filter(|w| content.contains(w.as_str())).count();
                (overlap, row)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .filter(|(score, _)| *score > 0)
            .take(limit)
            .map(|(_, row)| Candidate {
                id: row.id,
                content: row.content,
            })
            .collect())
    }

    async fn vector_search(
        &self,
        tenant: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError> {
        let mut scored: Vec<(f32, MemoryRow)> = self
            .tenant_rows(tenant)
            .into_iter()
            .map(|row| {
                let distance: f32 = row
                    .vector
                    .iter()
                    .zip(embedding)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (distance, row)
            })
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, row)| Candidate {
                id: row.id,
                content: row.content,
            })
            .collect())
    }

    async fn substring_search(
        &self,
        tenant: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError> {
        let needle = needle.to_lowercase();
        Ok(self
            .tenant_rows(tenant)
            .into_iter()
            .filter(|row| row.content.to_lowercase().contains(&needle))
            .take(limit)
            .map(|row| Candidate {
                id: row.id,
                content: row.content,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_partitions_by_tenant() {
        let store = MemoryDocumentStore::new();
        store
            .insert_rows("a", &["alpha doc".to_string()], &[vec![0.0; 4]])
            .await
            .unwrap();
        store
            .insert_rows("b", &["beta doc".to_string()], &[vec![0.0; 4]])
            .await
            .unwrap();

        let hits = store.substring_search("a", "doc", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "alpha doc");
    }

    #[tokio::test]
    async fn vector_search_ranks_nearest_first() {
        let store = MemoryDocumentStore::new();
        store
            .insert_rows(
                "t",
                &["far".to_string(), "near".to_string()],
                &[vec![10.0, 10.0], vec![1.0, 1.0]],
            )
            .await
            .unwrap();
        let hits = store.vector_search("t", &[1.1, 1.0], 2).await.unwrap();
        assert_eq!(hits[0].content, "near");
        assert_eq!(hits[1].content, "far");
    }

    #[tokio::test]
    async fn mismatched_texts_and_vectors_are_rejected() {
        let store = MemoryDocumentStore::new();
        let err = store
            .insert_rows("t", &["one".to_string()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Storage(_)));
    }
}
