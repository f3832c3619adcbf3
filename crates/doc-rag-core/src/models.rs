//! Core data models for the retrieval pipeline.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow from the chunker through the embedding index to context assembly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensionality of `text-embedding-3-small` vectors.
pub const DEFAULT_EMBEDDING_DIMS: usize = 1536;

/// Plain text of a parsed document plus the page range it came from.
///
/// This is the only shape the chunker consumes; it knows nothing about PDFs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    pub text: String,
    /// First page, 1-indexed, inclusive.
    pub page_range_start: u32,
    /// Last page, 1-indexed, inclusive.
    pub page_range_end: u32,
    /// Opaque identifier of the originating document (usually an absolute path).
    pub source_id: String,
}

impl DocumentSource {
    pub fn new(
        text: impl Into<String>,
        page_range_start: u32,
        page_range_end: u32,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            page_range_start,
            page_range_end,
            source_id: source_id.into(),
        }
    }

    /// Every page number in the inclusive range, ascending.
    pub fn page_numbers(&self) -> Vec<u32> {
        (self.page_range_start..=self.page_range_end).collect()
    }
}

/// A contiguous, possibly overlap-padded span of document text.
///
/// Created in one batch per document by [`crate::chunk::chunk_document`].
/// Text, position, and overlap fields are fixed from then on; the only
/// later transition is [`Chunk::with_embedding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{sanitized source stem}_chunk_{position:03}`.
    pub id: String,
    pub text: String,
    pub source_document: String,
    /// Page range of the whole parent document, not of this chunk alone.
    pub page_numbers: Vec<u32>,
    /// 0-indexed, gapless within a document.
    pub position: usize,
    pub token_count: usize,
    /// Length of `text` in Unicode scalar values.
    pub char_count: usize,
    pub has_overlap_before: bool,
    pub has_overlap_after: bool,
    pub overlap_with_previous: Option<String>,
    pub overlap_with_next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Attach an embedding vector, consuming the un-embedded chunk.
    pub fn with_embedding(self, embedding: Vec<f32>) -> Self {
        Self {
            embedding: Some(embedding),
            ..self
        }
    }

    /// True when an embedding is present and non-empty.
    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// First 50 characters of the text, with `...` appended when cut.
    pub fn preview(&self) -> String {
        let mut chars = self.text.chars();
        let head: String = chars.by_ref().take(50).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chunk({}: {:?})", self.id, self.preview())
    }
}

/// A chunk paired with its similarity score in `(0, 1]`.
///
/// Lists of these are always ordered by descending score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f64,
}

/// Output of budgeted context assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextResult {
    pub context: String,
    /// Exact token count of `context`, recomputed after joining.
    pub token_count: usize,
    /// Number of chunks present in `context`, including a truncated one.
    pub chunk_count: usize,
    /// True when any candidate chunk was cut short or left out.
    pub truncated: bool,
}

impl ContextResult {
    pub fn empty() -> Self {
        Self {
            context: String::new(),
            token_count: 0,
            chunk_count: 0,
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(text: &str) -> Chunk {
        Chunk {
            id: "doc_chunk_000".to_string(),
            text: text.to_string(),
            source_document: "/tmp/doc.pdf".to_string(),
            page_numbers: vec![1, 2],
            position: 0,
            token_count: 0,
            char_count: text.chars().count(),
            has_overlap_before: false,
            has_overlap_after: false,
            overlap_with_previous: None,
            overlap_with_next: None,
            embedding: None,
        }
    }

    #[test]
    fn test_page_numbers_inclusive() {
        let doc = DocumentSource::new("text", 3, 6, "/tmp/doc.pdf");
        assert_eq!(doc.page_numbers(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_with_embedding_keeps_fields() {
        let chunk = sample_chunk("Hello world");
        assert!(!chunk.has_embedding());
        let embedded = chunk.clone().with_embedding(vec![0.1, 0.2]);
        assert!(embedded.has_embedding());
        assert_eq!(embedded.text, chunk.text);
        assert_eq!(embedded.id, chunk.id);
    }

    #[test]
    fn test_empty_embedding_is_not_embedded() {
        let chunk = sample_chunk("Hello").with_embedding(Vec::new());
        assert!(!chunk.has_embedding());
    }

    #[test]
    fn test_preview_and_display() {
        let short = sample_chunk("Short text");
        assert_eq!(short.preview(), "Short text");
        assert_eq!(short.to_string(), "Chunk(doc_chunk_000: \"Short text\")");

        let long = sample_chunk(&"x".repeat(80));
        assert_eq!(long.preview(), format!("{}...", "x".repeat(50)));
    }
}
