//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is everything the pipeline needs from an
//! index backend: upsert embedded chunks, nearest-neighbour search, and
//! bulk deletion by source. [`memory::InMemoryVectorStore`] lives here;
//! the SQLite-backed store lives in the app crate.
//!
//! # Scoring
//!
//! Backends rank by squared Euclidean distance and report
//! `score = 1 / (1 + distance)`, so scores fall in `(0, 1]` and equal
//! vectors score exactly `1.0`. Ties are broken by chunk id.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`add`](VectorStore::add) | Upsert chunks that carry embeddings |
//! | [`search`](VectorStore::search) | Top-k by similarity, optional source filter |
//! | [`get`](VectorStore::get) | Fetch one chunk by id |
//! | [`delete`](VectorStore::delete) | Remove chunks by id |
//! | [`delete_by_source`](VectorStore::delete_by_source) | Remove one document's chunks |
//! | [`replace_source`](VectorStore::replace_source) | Swap one document's chunks atomically |
//! | [`clear`](VectorStore::clear) | Remove everything |
//! | [`count`](VectorStore::count) | Number of stored chunks |
//! | [`list_sources`](VectorStore::list_sources) | Distinct source ids, sorted |

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::embedding::{distance_to_score, squared_l2};
use crate::error::{RagError, Result};
use crate::models::{Chunk, RetrievalResult};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert chunks by id. Every chunk must carry a non-empty embedding
    /// of the collection's dimensionality; otherwise nothing is written.
    /// Returns the number of chunks written.
    async fn add(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Up to `top_k` chunks, best first. Returns every stored chunk when
    /// fewer than `top_k` exist, and `[]` for an empty store.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<RetrievalResult>>;

    async fn get(&self, id: &str) -> Result<Option<Chunk>>;

    /// Delete by id. Returns how many of the ids existed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn delete_by_source(&self, source: &str) -> Result<usize>;

    /// Replace every chunk of `source` with `chunks` as one atomic step.
    ///
    /// All checks run before anything is removed: each chunk must carry an
    /// embedding, belong to `source`, match the dimensionality of the other
    /// documents, and not reuse an id held by another document. On error
    /// the store is unchanged. Returns the number of chunks removed.
    async fn replace_source(&self, source: &str, chunks: &[Chunk]) -> Result<usize>;

    /// Delete everything. Returns the number of chunks removed.
    async fn clear(&self) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    async fn list_sources(&self) -> Result<Vec<String>>;
}

/// Check an `add` batch and return its embedding dimensionality.
///
/// `Ok(None)` for an empty batch.
pub fn validate_embedded(chunks: &[Chunk]) -> Result<Option<usize>> {
    let mut dims = None;
    for chunk in chunks {
        let len = match &chunk.embedding {
            Some(e) if !e.is_empty() => e.len(),
            _ => {
                return Err(RagError::integrity(format!(
                    "chunk {} has no embedding; embed chunks before adding them",
                    chunk.id
                )))
            }
        };
        match dims {
            None => dims = Some(len),
            Some(d) if d != len => {
                return Err(RagError::validation(format!(
                    "chunk {} has a {}-dimensional embedding, expected {}",
                    chunk.id, len, d
                )))
            }
            Some(_) => {}
        }
    }
    Ok(dims)
}

/// Fail when a vector's length differs from the collection's.
pub fn check_dims(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::validation(format!(
            "dimension mismatch: collection holds {}-dimensional vectors, got {}",
            expected, actual
        )));
    }
    Ok(())
}

/// Fail unless every chunk of a replacement batch belongs to `source`.
pub fn check_sources(source: &str, chunks: &[Chunk]) -> Result<()> {
    match chunks.iter().find(|c| c.source_document != source) {
        Some(stray) => Err(RagError::validation(format!(
            "chunk {} belongs to {}, not {}",
            stray.id, stray.source_document, source
        ))),
        None => Ok(()),
    }
}

/// Fail when chunk `id` is already stored for a different document.
///
/// Ids derive from the file stem, so `/a/notes.pdf` and `/b/notes.pdf`
/// collide.
pub fn check_owner(id: &str, owner: &str, source: &str) -> Result<()> {
    if owner != source {
        return Err(RagError::validation(format!(
            "chunk id {} already belongs to {}; rename {} or index it into another collection",
            id, owner, source
        )));
    }
    Ok(())
}

pub fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(RagError::validation("top_k must be positive, got 0"));
    }
    Ok(())
}

/// Score candidates against `query` and keep the best `top_k`.
///
/// Every candidate must carry an embedding of `query.len()` dimensions.
pub fn rank_by_distance(
    query: &[f32],
    candidates: Vec<Chunk>,
    top_k: usize,
) -> Result<Vec<RetrievalResult>> {
    let mut scored = Vec::with_capacity(candidates.len());
    for chunk in candidates {
        let distance = {
            let embedding = chunk.embedding.as_deref().unwrap_or_default();
            check_dims(embedding.len(), query.len())?;
            squared_l2(query, embedding)
        };
        scored.push((distance, chunk));
    }

    scored.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });
    scored.truncate(top_k);

    Ok(scored
        .into_iter()
        .map(|(distance, chunk)| RetrievalResult {
            score: distance_to_score(distance),
            chunk,
        })
        .collect())
}

/// Page numbers as stored in flat metadata: `"3,4,5"`.
pub fn encode_page_numbers(pages: &[u32]) -> String {
    pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_page_numbers(raw: &str) -> Result<Vec<u32>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split(',')
        .map(|p| {
            p.trim()
                .parse::<u32>()
                .map_err(|e| RagError::storage(format!("bad page number {:?}: {}", p, e)))
        })
        .collect()
}
