//! Query → ranked chunks.
//!
//! The [`Retriever`] validates the request, skips the embedding call
//! entirely when the index is empty, embeds the query, searches, and
//! applies an optional minimum-score post-filter. The filter never asks
//! the store for extra candidates to make up for what it drops.

use std::sync::Arc;

use tracing::{debug, info};

use crate::embedding::EmbeddingGenerator;
use crate::error::{RagError, Result};
use crate::models::{Chunk, RetrievalResult};
use crate::store::VectorStore;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveOptions {
    pub top_k: usize,
    /// Only return chunks from this source document.
    pub source_filter: Option<String>,
    /// Drop results scoring below this, in `[0, 1]`.
    pub min_score: Option<f64>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            source_filter: None,
            min_score: None,
        }
    }
}

impl RetrieveOptions {
    pub fn top_k(top_k: usize) -> Self {
        Self {
            top_k,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::validation("top_k must be positive, got 0"));
        }
        if let Some(min) = self.min_score {
            if !(0.0..=1.0).contains(&min) {
                return Err(RagError::validation(format!(
                    "min_score must be between 0 and 1, got {}",
                    min
                )));
            }
        }
        Ok(())
    }
}

pub struct Retriever {
    embedder: Arc<EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(embedder: Arc<EmbeddingGenerator>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Ranked `(chunk, score)` pairs, best first.
    ///
    /// # Errors
    ///
    /// [`RagError::Validation`] for an empty query, `top_k == 0`, or a
    /// `min_score` outside `[0, 1]`, raised before any embedding or search.
    pub async fn retrieve_with_scores(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>> {
        if query.trim().is_empty() {
            return Err(RagError::validation("query cannot be empty"));
        }
        options.validate()?;

        if self.store.count().await? == 0 {
            info!("Index is empty, nothing to retrieve");
            return Ok(Vec::new());
        }

        debug!(
            top_k = options.top_k,
            source = options.source_filter.as_deref().unwrap_or("*"),
            "Retrieving chunks"
        );
        let query_vector = self.embedder.embed_query(query).await?;
        let mut results = self
            .store
            .search(&query_vector, options.top_k, options.source_filter.as_deref())
            .await?;

        if let Some(min) = options.min_score {
            let before = results.len();
            results.retain(|r| r.score >= min);
            debug!(
                min_score = min,
                dropped = before - results.len(),
                "Applied score threshold"
            );
        }

        info!(
            results = results.len(),
            top_score = results.first().map(|r| r.score).unwrap_or(0.0),
            "Retrieval completed"
        );
        Ok(results)
    }

    /// Like [`retrieve_with_scores`](Self::retrieve_with_scores), chunks only.
    pub async fn retrieve(&self, query: &str, options: &RetrieveOptions) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_with_scores(query, options)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect())
    }
}
