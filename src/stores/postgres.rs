//! Postgres document store backed by `pgvector` and `pg_trgm`.
//!
//! One connection is opened per ingestion or query request and shared by
//! every worker through an async mutex: the connection is the pipeline's
//! single write-serialization point, so at most one statement is in flight
//! at a time. Vectors travel as `[x,y,...]` text literals cast to `vector`,
//! which keeps the wire format independent of client-side pgvector support.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE documents (
//!     id        BIGSERIAL PRIMARY KEY,
//!     tenant_id TEXT NOT NULL,
//!     content   TEXT NOT NULL,
//!     embedding VECTOR(1536) NOT NULL
//! );
//! ```

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Row};
use tokio::sync::Mutex;

use super::DocumentStore;
use crate::types::{Candidate, RagError};

/// Shared-connection Postgres store.
pub struct PgDocumentStore {
    conn: Mutex<PgConnection>,
    dimension: usize,
}

impl PgDocumentStore {
    /// Opens one connection to `database_url`. Connection failure is fatal
    /// for the whole request; no partial processing is attempted.
    pub async fn connect(database_url: &str, dimension: usize) -> Result<Self, RagError> {
        let conn = PgConnection::connect(database_url)
            .await
            .map_err(|err| RagError::Storage(format!("connect failed: {err}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimension,
        })
    }

    /// Closes the underlying connection.
    pub async fn close(self) -> Result<(), RagError> {
        self.conn.into_inner().close().await?;
        Ok(())
    }
}

/// Formats a vector as a pgvector text literal: `[0.100000,0.200000,...]`.
pub fn vector_literal(vector: &[f32]) -> String {
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{value:.6}"));
    }
    out.push(']');
    out
}

fn rows_to_candidates(rows: Vec<sqlx::postgres::PgRow>) -> Result<Vec<Candidate>, RagError> {
    rows.into_iter()
        .map(|row| {
            Ok(Candidate {
                id: row.try_get::<i64, _>(0)?,
                content: row.try_get::<String, _>(1)?,
            })
        })
        .collect()
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert_rows(
        &self,
        tenant: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), RagError> {
        if texts.is_empty() {
            return Ok(());
        }
        if texts.len() != vectors.len() {
            return Err(RagError::Storage(format!(
                "{} texts but {} vectors",
                texts.len(),
                vectors.len()
            )));
        }
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO documents (tenant_id, content, embedding) ",
        );
        builder.push_values(texts.iter().zip(vectors), |mut row, (text, vector)| {
            row.push_bind(tenant)
                .push_bind(text)
                .push_bind(vector_literal(vector))
                .push_unseparated("::vector");
        });

        let mut conn = self.conn.lock().await;
        builder.build().execute(&mut *conn).await?;
        Ok(())
    }

    async fn lexical_search(
        &self,
        tenant: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(
            "SELECT id, content FROM documents \
             WHERE tenant_id = $1 \
             ORDER BY similarity(content, $2) DESC \
             LIMIT $3",
        )
        .bind(tenant)
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;
        rows_to_candidates(rows)
    }

    async fn vector_search(
        &self,
        tenant: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(
            "SELECT id, content FROM documents \
             WHERE tenant_id = $1 \
             ORDER BY embedding <-> $2::vector \
             LIMIT $3",
        )
        .bind(tenant)
        .bind(vector_literal(embedding))
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;
        rows_to_candidates(rows)
    }

    async fn substring_search(
        &self,
        tenant: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RagError> {
        let mut conn = self.conn.lock().await;
        let rows = sqlx::query(
            "SELECT id, content FROM documents \
             WHERE tenant_id = $1 AND content ILIKE $2 \
             LIMIT $3",
        )
        .bind(tenant)
        .bind(format!("%{needle}%"))
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;
        rows_to_candidates(rows)
    }
}
