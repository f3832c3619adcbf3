//! Wiring: configuration → store, embedder, and [`RagPipeline`].

use anyhow::Result;
use std::sync::Arc;

use doc_rag_core::embedding::EmbeddingGenerator;
use doc_rag_core::pipeline::RagPipeline;
use doc_rag_core::tokenizer::Tokenizer;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteVectorStore;

/// Open the configured collection, creating the database if needed.
pub async fn open_store(config: &Config) -> Result<SqliteVectorStore> {
    let pool = db::connect(&config.store.path).await?;
    SqliteVectorStore::open(pool, config.store.collection.clone()).await
}

/// Build the full pipeline over an already-open store.
///
/// Fails when the embedding provider is disabled or cannot be created.
pub fn build_pipeline(config: &Config, store: Arc<SqliteVectorStore>) -> Result<RagPipeline> {
    let provider = create_provider(&config.embedding)?;
    let embedder = EmbeddingGenerator::new(provider, config.embedding_options())?;
    let pipeline = RagPipeline::new(
        Tokenizer::cl100k()?,
        config.chunk_params(),
        Arc::new(embedder),
        store,
    )?;
    Ok(pipeline)
}
