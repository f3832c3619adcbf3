//! `docrag chunk` and `docrag index`.
//!
//! `chunk` previews how a document would be split, touching neither the
//! embedding provider nor the store. `index` runs the full
//! chunk → embed → replace pipeline for one document.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use doc_rag_core::chunk::chunk_document;
use doc_rag_core::pipeline::IndexReport;
use doc_rag_core::tokenizer::Tokenizer;

use crate::config::Config;
use crate::pipeline::{build_pipeline, open_store};
use crate::source::load_document;

pub fn run_chunk(
    config: &Config,
    path: &Path,
    start_page: u32,
    end_page: Option<u32>,
    full: bool,
) -> Result<()> {
    let doc = load_document(path, start_page, end_page)?;
    let tokenizer = Tokenizer::cl100k()?;
    let chunks = chunk_document(&doc, &config.chunk_params(), &tokenizer)?;

    println!("chunk {}", doc.source_id);
    println!("  pages: {}-{}", doc.page_range_start, doc.page_range_end);
    println!("  chunks: {}", chunks.len());
    if chunks.is_empty() {
        return Ok(());
    }
    let total_tokens: usize = chunks.iter().map(|c| c.token_count).sum();
    println!("  avg tokens: {}", total_tokens / chunks.len());
    println!();

    for chunk in &chunks {
        println!(
            "{}  tokens={} chars={}",
            chunk.id, chunk.token_count, chunk.char_count
        );
        if full {
            println!("{}", chunk.text);
        } else {
            println!("    {:?}", chunk.preview());
        }
        println!();
    }
    Ok(())
}

pub async fn run_index(
    config: &Config,
    path: &Path,
    start_page: u32,
    end_page: Option<u32>,
) -> Result<IndexReport> {
    let doc = load_document(path, start_page, end_page)?;
    let store = Arc::new(open_store(config).await?);
    let pipeline = build_pipeline(config, store.clone())?;

    let report = pipeline.index_document(&doc).await;
    store.close().await;
    let report = report?;

    println!("index {}", report.source);
    println!("  chunks written: {}", report.chunks);
    println!("  chunks replaced: {}", report.replaced);
    println!("  embedding tokens: {}", report.embedding_tokens);
    println!("  estimated cost: ${:.6}", report.estimated_cost);
    println!("ok");
    Ok(report)
}
