//! `docrag get`: print one stored chunk.

use anyhow::{bail, Result};

use doc_rag_core::context::format_pages;
use doc_rag_core::models::Chunk;
use doc_rag_core::store::VectorStore;

use crate::config::Config;
use crate::pipeline::open_store;

pub async fn get_chunk(config: &Config, id: &str) -> Result<Option<Chunk>> {
    let store = open_store(config).await?;
    let chunk = store.get(id).await;
    store.close().await;
    Ok(chunk?)
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let chunk = match get_chunk(config, id).await? {
        Some(c) => c,
        None => bail!("chunk not found: {}", id),
    };

    println!("--- Chunk ---");
    println!("id:           {}", chunk.id);
    println!("source:       {}", chunk.source_document);
    println!("position:     {}", chunk.position);
    println!("pages:        {}", format_pages(&chunk.page_numbers));
    println!("tokens:       {}", chunk.token_count);
    println!("chars:        {}", chunk.char_count);
    println!(
        "previous:     {}",
        chunk.overlap_with_previous.as_deref().unwrap_or("-")
    );
    println!(
        "next:         {}",
        chunk.overlap_with_next.as_deref().unwrap_or("-")
    );
    println!(
        "embedding:    {} dims",
        chunk.embedding.as_ref().map(Vec::len).unwrap_or(0)
    );
    println!();
    println!("--- Text ---");
    println!("{}", chunk.text);

    Ok(())
}
