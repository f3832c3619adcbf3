//! End-to-end orchestration: index a document, answer a query with context.
//!
//! Indexing runs chunk → embed → [`VectorStore::replace_source`], so
//! re-indexing a document swaps its chunks in one step. Embedding happens
//! before the store is touched, and the replacement is atomic: any failure
//! leaves the previous index intact.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::chunk::{chunk_document, ChunkParams};
use crate::context::{build_context_with_limit, ContextOptions};
use crate::embedding::{estimate_cost, EmbeddingGenerator};
use crate::error::{RagError, Result};
use crate::models::{Chunk, ContextResult, DocumentSource, RetrievalResult};
use crate::retrieval::{RetrieveOptions, Retriever};
use crate::store::VectorStore;
use crate::tokenizer::Tokenizer;

pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4000;

/// Outcome of [`RagPipeline::index_document`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub source: String,
    /// Chunks written for this document.
    pub chunks: usize,
    /// Chunks of a previous indexing run that were replaced.
    pub replaced: usize,
    pub embedding_tokens: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub retrieve: RetrieveOptions,
    pub max_tokens: usize,
    pub context: ContextOptions,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            retrieve: RetrieveOptions::default(),
            max_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            context: ContextOptions::default(),
        }
    }
}

/// Ranked results plus the budgeted context built from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    pub results: Vec<RetrievalResult>,
    pub context: ContextResult,
}

pub struct RagPipeline {
    tokenizer: Tokenizer,
    params: ChunkParams,
    embedder: Arc<EmbeddingGenerator>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
}

impl RagPipeline {
    pub fn new(
        tokenizer: Tokenizer,
        params: ChunkParams,
        embedder: Arc<EmbeddingGenerator>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        params.validate()?;
        let retriever = Retriever::new(embedder.clone(), store.clone());
        Ok(Self {
            tokenizer,
            params,
            embedder,
            store,
            retriever,
        })
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn chunk_params(&self) -> &ChunkParams {
        &self.params
    }

    pub fn embedder(&self) -> &EmbeddingGenerator {
        &self.embedder
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Chunk without embedding or storing anything.
    pub fn chunk(&self, doc: &DocumentSource) -> Result<Vec<Chunk>> {
        chunk_document(doc, &self.params, &self.tokenizer)
    }

    /// Chunk, embed, and store one document, replacing earlier chunks of
    /// the same source. A document yielding no chunks leaves the index
    /// untouched.
    pub async fn index_document(&self, doc: &DocumentSource) -> Result<IndexReport> {
        let chunks = self.chunk(doc)?;
        if chunks.is_empty() {
            warn!(source = %doc.source_id, "Document produced no chunks, index unchanged");
            return Ok(IndexReport {
                source: doc.source_id.clone(),
                chunks: 0,
                replaced: 0,
                embedding_tokens: 0,
                estimated_cost: 0.0,
            });
        }

        let tokens_before = self.embedder.usage().total_tokens;
        let embedded = self.embedder.embed(chunks).await?;
        let embedding_tokens = self
            .embedder
            .usage()
            .total_tokens
            .saturating_sub(tokens_before);

        let replaced = self
            .store
            .replace_source(&doc.source_id, &embedded)
            .await?;

        let report = IndexReport {
            source: doc.source_id.clone(),
            chunks: embedded.len(),
            replaced,
            embedding_tokens,
            estimated_cost: estimate_cost(embedding_tokens, self.embedder_price()),
        };
        info!(
            source = %report.source,
            chunks = report.chunks,
            replaced = report.replaced,
            tokens = report.embedding_tokens,
            "Indexed document"
        );
        Ok(report)
    }

    /// Retrieve for `query`, then assemble a context within `max_tokens`.
    pub async fn query_context(&self, query: &str, options: &QueryOptions) -> Result<QueryContext> {
        if options.max_tokens == 0 {
            return Err(RagError::validation("max_tokens must be positive, got 0"));
        }
        let results = self
            .retriever
            .retrieve_with_scores(query, &options.retrieve)
            .await?;
        let chunks: Vec<Chunk> = results.iter().map(|r| r.chunk.clone()).collect();
        let context =
            build_context_with_limit(&chunks, options.max_tokens, &options.context, &self.tokenizer)?;
        Ok(QueryContext { results, context })
    }

    fn embedder_price(&self) -> f64 {
        self.embedder.options().price_per_million_tokens
    }
}
