//! Index maintenance commands: `sources`, `count`, `delete`, `clear`.

use anyhow::Result;

use doc_rag_core::store::VectorStore;

use crate::config::Config;
use crate::pipeline::open_store;
use crate::query::resolve_source;

pub async fn list_sources(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let summaries = store.source_summaries().await;
    store.close().await;
    let summaries = summaries?;

    if summaries.is_empty() {
        println!("No indexed documents.");
        return Ok(());
    }

    println!("{:<8} {:<26} SOURCE", "CHUNKS", "INDEXED");
    for s in &summaries {
        let indexed = chrono::DateTime::parse_from_rfc3339(&s.indexed_at)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|_| s.indexed_at.clone());
        println!("{:<8} {:<26} {}", s.chunks, indexed, s.source);
    }
    Ok(())
}

pub async fn run_count(config: &Config) -> Result<usize> {
    let store = open_store(config).await?;
    let count = store.count().await;
    store.close().await;
    let count = count?;
    println!("{}", count);
    Ok(count)
}

pub async fn run_delete(config: &Config, source: &str) -> Result<usize> {
    let source = resolve_source(source);
    let store = open_store(config).await?;
    let removed = store.delete_by_source(&source).await;
    store.close().await;
    let removed = removed?;
    println!("deleted {} chunks from {}", removed, source);
    Ok(removed)
}

pub async fn run_clear(config: &Config) -> Result<usize> {
    let store = open_store(config).await?;
    let removed = store.clear().await;
    store.close().await;
    let removed = removed?;
    println!(
        "cleared {} chunks from collection {}",
        removed, config.store.collection
    );
    Ok(removed)
}
