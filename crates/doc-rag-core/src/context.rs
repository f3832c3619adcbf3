//! Context assembly: retrieved chunks → one prompt-ready string.
//!
//! [`build_context`] joins every chunk. [`build_context_with_limit`] stops
//! before a token budget is exceeded, cutting the first chunk that does
//! not fit when enough budget remains for it to be worth including.
//! [`estimate_tokens`] predicts the token count of [`build_context`]
//! output exactly.
//!
//! Input chunks are borrowed and never reordered in place.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::models::{Chunk, ContextResult};
use crate::tokenizer::Tokenizer;

pub const DEFAULT_SEPARATOR: &str = "\n\n---\n\n";
/// Appended to a chunk cut short by the budget.
pub const ELLIPSIS: &str = "...";
/// A cut chunk must keep more than this many tokens, plus the ellipsis.
pub const MIN_TRUNCATED_TOKENS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkOrdering {
    /// Keep input order (the caller ranked by score).
    #[default]
    Relevance,
    /// Reading order: by source document, then position.
    Position,
}

impl std::str::FromStr for ChunkOrdering {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "relevance" => Ok(ChunkOrdering::Relevance),
            "position" => Ok(ChunkOrdering::Position),
            other => Err(RagError::validation(format!(
                "unknown ordering {:?}, expected \"relevance\" or \"position\"",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub separator: String,
    /// Prefix each chunk with `[Source: <file>, Pages: <pages>]`.
    pub include_metadata: bool,
    pub ordering: ChunkOrdering,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            include_metadata: false,
            ordering: ChunkOrdering::Relevance,
        }
    }
}

/// Join all chunks. Empty input gives an empty string.
pub fn build_context(chunks: &[Chunk], options: &ContextOptions) -> String {
    formatted(chunks, options).join(&options.separator)
}

/// Join chunks in order until `max_tokens` would be exceeded.
///
/// The returned `token_count` is recounted from the final string and
/// never exceeds `max_tokens`.
///
/// # Errors
///
/// [`RagError::Validation`] if `max_tokens` is zero.
pub fn build_context_with_limit(
    chunks: &[Chunk],
    max_tokens: usize,
    options: &ContextOptions,
    tokenizer: &Tokenizer,
) -> Result<ContextResult> {
    if max_tokens == 0 {
        return Err(RagError::validation("max_tokens must be positive, got 0"));
    }
    if chunks.is_empty() {
        return Ok(ContextResult::empty());
    }

    let separator_tokens = tokenizer.count_tokens(&options.separator);
    let ellipsis_tokens = tokenizer.count_tokens(ELLIPSIS);

    let candidates = formatted(chunks, options);
    let mut pieces: Vec<String> = Vec::with_capacity(candidates.len());
    let mut running = 0usize;
    let mut truncated = false;

    for text in candidates.iter() {
        let join_cost = if pieces.is_empty() { 0 } else { separator_tokens };
        let cost = tokenizer.count_tokens(text);
        if running + join_cost + cost <= max_tokens {
            pieces.push(text.clone());
            running += join_cost + cost;
            continue;
        }

        truncated = true;
        let remaining = max_tokens.saturating_sub(running + join_cost);
        if remaining > MIN_TRUNCATED_TOKENS + ellipsis_tokens {
            let head = tokenizer.head(text, remaining - ellipsis_tokens);
            if !head.trim().is_empty() {
                debug!(remaining, "Truncating final chunk to fit budget");
                pieces.push(format!("{}{}", head, ELLIPSIS));
            }
        }
        break;
    }

    let mut context = pieces.join(&options.separator);
    let mut token_count = tokenizer.count_tokens(&context);
    // merges across a seam can add a token; shed pieces until it fits
    while token_count > max_tokens && !pieces.is_empty() {
        pieces.pop();
        truncated = true;
        context = pieces.join(&options.separator);
        token_count = tokenizer.count_tokens(&context);
    }

    info!(
        chunks = pieces.len(),
        candidates = chunks.len(),
        tokens = token_count,
        max_tokens,
        truncated,
        "Built context"
    );

    Ok(ContextResult {
        chunk_count: pieces.len(),
        context,
        token_count,
        truncated,
    })
}

/// Token count of what [`build_context`] would return for the same input.
pub fn estimate_tokens(chunks: &[Chunk], options: &ContextOptions, tokenizer: &Tokenizer) -> usize {
    if chunks.is_empty() {
        return 0;
    }
    // BPE merges can span a join, so count the joined text, not the parts
    tokenizer.count_tokens(&build_context(chunks, options))
}

/// Compact page label: `"4"`, `"3-6"`, `"1, 4, 9"`, or `"unknown"`.
pub fn format_pages(pages: &[u32]) -> String {
    if pages.is_empty() {
        return "unknown".to_string();
    }
    let mut sorted = pages.to_vec();
    sorted.sort_unstable();

    if sorted.len() == 1 {
        return sorted[0].to_string();
    }
    let contiguous = sorted.windows(2).all(|w| w[1] == w[0] + 1);
    if contiguous {
        format!("{}-{}", sorted[0], sorted[sorted.len() - 1])
    } else {
        sorted
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn ordered<'a>(chunks: &'a [Chunk], ordering: ChunkOrdering) -> Vec<&'a Chunk> {
    let mut refs: Vec<&Chunk> = chunks.iter().collect();
    if ordering == ChunkOrdering::Position {
        refs.sort_by(|a, b| {
            a.source_document
                .cmp(&b.source_document)
                .then(a.position.cmp(&b.position))
        });
    }
    refs
}

fn formatted(chunks: &[Chunk], options: &ContextOptions) -> Vec<String> {
    ordered(chunks, options.ordering)
        .into_iter()
        .map(|chunk| format_chunk(chunk, options.include_metadata))
        .collect()
}

fn format_chunk(chunk: &Chunk, include_metadata: bool) -> String {
    if !include_metadata {
        return chunk.text.clone();
    }
    let source = Path::new(&chunk.source_document)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| chunk.source_document.clone());
    format!(
        "[Source: {}, Pages: {}]\n{}",
        source,
        format_pages(&chunk.page_numbers),
        chunk.text
    )
}
