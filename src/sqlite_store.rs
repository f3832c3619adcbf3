//! SQLite-backed [`VectorStore`].
//!
//! Chunks and their embeddings live in one row each, keyed by
//! `(collection, id)`. Embeddings are little-endian `f32` BLOBs; page
//! numbers are stored comma-joined. Every other chunk field has its own
//! column, so a fetched chunk equals the chunk that was added.
//!
//! Search is a brute-force scan over the collection (or one source),
//! ranked by squared L2 distance in Rust.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use doc_rag_core::embedding::{blob_to_vec, vec_to_blob};
use doc_rag_core::models::{Chunk, RetrievalResult};
use doc_rag_core::store::{
    check_dims, check_owner, check_sources, check_top_k, decode_page_numbers, encode_page_numbers,
    rank_by_distance, validate_embedded, VectorStore,
};
use doc_rag_core::{RagError, Result};

use crate::migrate;

const CHUNK_COLUMNS: &str = "id, source_document, position, text, page_numbers, token_count, \
     char_count, has_overlap_before, has_overlap_after, overlap_with_previous, \
     overlap_with_next, embedding";

/// Per-source summary for listing what has been indexed.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub chunks: i64,
    /// RFC 3339 time of the most recent write for this source.
    pub indexed_at: String,
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

fn storage(e: sqlx::Error) -> RagError {
    RagError::storage(e.to_string())
}

impl SqliteVectorStore {
    /// Wrap an open pool, creating the schema if needed.
    pub async fn open(pool: SqlitePool, collection: impl Into<String>) -> anyhow::Result<Self> {
        migrate::run_migrations(&pool).await?;
        let collection = collection.into();
        debug!(collection = %collection, "Opened SQLite vector store");
        Ok(Self { pool, collection })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Dimensionality of the stored vectors, `None` when empty.
    pub async fn dims(&self) -> Result<Option<usize>> {
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM chunks WHERE collection = ? LIMIT 1")
                .bind(&self.collection)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        Ok(dims.map(|d| d as usize))
    }

    pub async fn source_summaries(&self) -> Result<Vec<SourceSummary>> {
        let rows = sqlx::query(
            "SELECT source_document, COUNT(*) AS n, MAX(indexed_at) AS indexed_at \
             FROM chunks WHERE collection = ? \
             GROUP BY source_document ORDER BY source_document",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                Ok(SourceSummary {
                    source: row.try_get("source_document").map_err(storage)?,
                    chunks: row.try_get("n").map_err(storage)?,
                    indexed_at: row.try_get("indexed_at").map_err(storage)?,
                })
            })
            .collect()
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let page_numbers: String = row.try_get("page_numbers").map_err(storage)?;
    let position: i64 = row.try_get("position").map_err(storage)?;
    let token_count: i64 = row.try_get("token_count").map_err(storage)?;
    let char_count: i64 = row.try_get("char_count").map_err(storage)?;
    let blob: Vec<u8> = row.try_get("embedding").map_err(storage)?;

    Ok(Chunk {
        id: row.try_get("id").map_err(storage)?,
        text: row.try_get("text").map_err(storage)?,
        source_document: row.try_get("source_document").map_err(storage)?,
        page_numbers: decode_page_numbers(&page_numbers)?,
        position: position as usize,
        token_count: token_count as usize,
        char_count: char_count as usize,
        has_overlap_before: row.try_get("has_overlap_before").map_err(storage)?,
        has_overlap_after: row.try_get("has_overlap_after").map_err(storage)?,
        overlap_with_previous: row.try_get("overlap_with_previous").map_err(storage)?,
        overlap_with_next: row.try_get("overlap_with_next").map_err(storage)?,
        embedding: Some(blob_to_vec(&blob)),
    })
}

async fn upsert_chunk(
    conn: &mut SqliteConnection,
    collection: &str,
    chunk: &Chunk,
    dims: usize,
    indexed_at: &str,
) -> Result<()> {
    let embedding = chunk.embedding.as_deref().unwrap_or_default();
    sqlx::query(
        r#"
        INSERT INTO chunks (collection, id, source_document, position, text,
            page_numbers, token_count, char_count, has_overlap_before,
            has_overlap_after, overlap_with_previous, overlap_with_next,
            embedding, dims, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(collection, id) DO UPDATE SET
            source_document = excluded.source_document,
            position = excluded.position,
            text = excluded.text,
            page_numbers = excluded.page_numbers,
            token_count = excluded.token_count,
            char_count = excluded.char_count,
            has_overlap_before = excluded.has_overlap_before,
            has_overlap_after = excluded.has_overlap_after,
            overlap_with_previous = excluded.overlap_with_previous,
            overlap_with_next = excluded.overlap_with_next,
            embedding = excluded.embedding,
            dims = excluded.dims,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(collection)
    .bind(&chunk.id)
    .bind(&chunk.source_document)
    .bind(chunk.position as i64)
    .bind(&chunk.text)
    .bind(encode_page_numbers(&chunk.page_numbers))
    .bind(chunk.token_count as i64)
    .bind(chunk.char_count as i64)
    .bind(chunk.has_overlap_before)
    .bind(chunk.has_overlap_after)
    .bind(&chunk.overlap_with_previous)
    .bind(&chunk.overlap_with_next)
    .bind(vec_to_blob(embedding))
    .bind(dims as i64)
    .bind(indexed_at)
    .execute(&mut *conn)
    .await
    .map_err(storage)?;
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        let Some(dims) = validate_embedded(chunks)? else {
            return Ok(0);
        };
        if let Some(existing) = self.dims().await? {
            check_dims(existing, dims)?;
        }

        let indexed_at = chrono::Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(storage)?;
        for chunk in chunks {
            upsert_chunk(&mut *tx, &self.collection, chunk, dims, &indexed_at).await?;
        }
        tx.commit().await.map_err(storage)?;

        info!(
            collection = %self.collection,
            added = chunks.len(),
            "Added chunks to vector store"
        );
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<RetrievalResult>> {
        check_top_k(top_k)?;
        let rows = match source_filter {
            Some(source) => {
                sqlx::query(&format!(
                    "SELECT {} FROM chunks WHERE collection = ? AND source_document = ?",
                    CHUNK_COLUMNS
                ))
                .bind(&self.collection)
                .bind(source)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM chunks WHERE collection = ?",
                    CHUNK_COLUMNS
                ))
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(storage)?;

        let candidates = rows.iter().map(row_to_chunk).collect::<Result<Vec<_>>>()?;
        debug!(candidates = candidates.len(), top_k, "Scanning vectors");
        rank_by_distance(query, candidates, top_k)
    }

    async fn get(&self, id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE collection = ? AND id = ?",
            CHUNK_COLUMNS
        ))
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.as_ref().map(row_to_chunk).transpose()
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let mut removed = 0u64;
        for id in ids {
            removed += sqlx::query("DELETE FROM chunks WHERE collection = ? AND id = ?")
                .bind(&self.collection)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(storage)?
                .rows_affected();
        }
        tx.commit().await.map_err(storage)?;
        info!(requested = ids.len(), removed, "Deleted chunks by id");
        Ok(removed as usize)
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let removed =
            sqlx::query("DELETE FROM chunks WHERE collection = ? AND source_document = ?")
                .bind(&self.collection)
                .bind(source)
                .execute(&self.pool)
                .await
                .map_err(storage)?
                .rows_affected();
        info!(source, removed, "Deleted chunks for source");
        Ok(removed as usize)
    }

    async fn replace_source(&self, source: &str, chunks: &[Chunk]) -> Result<usize> {
        let dims = validate_embedded(chunks)?;
        check_sources(source, chunks)?;

        let mut tx = self.pool.begin().await.map_err(storage)?;
        if let Some(dims) = dims {
            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT dims FROM chunks \
                 WHERE collection = ? AND source_document != ? LIMIT 1",
            )
            .bind(&self.collection)
            .bind(source)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
            if let Some(existing) = existing {
                check_dims(existing as usize, dims)?;
            }
        }
        for chunk in chunks {
            let owner: Option<String> = sqlx::query_scalar(
                "SELECT source_document FROM chunks WHERE collection = ? AND id = ?",
            )
            .bind(&self.collection)
            .bind(&chunk.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
            if let Some(owner) = owner {
                check_owner(&chunk.id, &owner, source)?;
            }
        }

        let removed =
            sqlx::query("DELETE FROM chunks WHERE collection = ? AND source_document = ?")
                .bind(&self.collection)
                .bind(source)
                .execute(&mut *tx)
                .await
                .map_err(storage)?
                .rows_affected();
        if let Some(dims) = dims {
            let indexed_at = chrono::Utc::now().to_rfc3339();
            for chunk in chunks {
                upsert_chunk(&mut *tx, &self.collection, chunk, dims, &indexed_at).await?;
            }
        }
        tx.commit().await.map_err(storage)?;

        info!(
            collection = %self.collection,
            source,
            removed,
            added = chunks.len(),
            "Replaced chunks for source"
        );
        Ok(removed as usize)
    }

    async fn clear(&self) -> Result<usize> {
        let removed = sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await
            .map_err(storage)?
            .rows_affected();
        info!(collection = %self.collection, removed, "Cleared collection");
        Ok(removed as usize)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(n as usize)
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT DISTINCT source_document FROM chunks WHERE collection = ? \
             ORDER BY source_document",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)
    }
}
