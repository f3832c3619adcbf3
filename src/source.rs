//! Document loading: file on disk → [`DocumentSource`].
//!
//! PDFs are read page by page with `pdf-extract`. Plain text and
//! Markdown files count as a single page. Page ranges are 1-indexed and
//! inclusive:
//!
//! - `start < 1` or `start > end` → error
//! - `end` past the last page → clipped, with a warning
//! - `start` past the last page → error
//!
//! The source id is the canonical absolute path, so the same file always
//! maps to the same chunk ids.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{info, warn};

use doc_rag_core::models::DocumentSource;

/// Formats [`load_document`] accepts, by lowercase extension.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown"];

pub fn load_document(path: &Path, start_page: u32, end_page: Option<u32>) -> Result<DocumentSource> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", path.display()))?;
    let extension = canonical
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    info!(path = %canonical.display(), "Loading document");

    let pages = match extension.as_str() {
        "pdf" => {
            let bytes = std::fs::read(&canonical)
                .with_context(|| format!("Failed to read {}", canonical.display()))?;
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?
        }
        "txt" | "md" | "markdown" => {
            let text = std::fs::read_to_string(&canonical)
                .with_context(|| format!("Failed to read {}", canonical.display()))?;
            vec![text]
        }
        other => bail!(
            "Unsupported file type '{}'. Supported: {}",
            other,
            SUPPORTED_EXTENSIONS.join(", ")
        ),
    };

    let (text, start, end) = select_pages(&pages, start_page, end_page)?;
    info!(
        path = %canonical.display(),
        start,
        end,
        chars = text.chars().count(),
        "Document loaded"
    );

    Ok(DocumentSource::new(
        text,
        start,
        end,
        canonical.to_string_lossy(),
    ))
}

/// Join the pages in `start..=end` with newlines, applying the range rules.
///
/// Returns the text and the effective (possibly clipped) range.
pub fn select_pages(pages: &[String], start: u32, end: Option<u32>) -> Result<(String, u32, u32)> {
    let total = pages.len() as u32;
    let requested_end = end.unwrap_or(total);

    if start < 1 {
        bail!("Invalid page range: pages are 1-indexed, got start={}", start);
    }
    if start > requested_end {
        bail!(
            "Invalid page range: start ({}) > end ({})",
            start,
            requested_end
        );
    }

    let mut end = requested_end;
    if end > total {
        warn!(
            requested_end,
            total_pages = total,
            "Page range exceeds document length, clipping"
        );
        end = total;
    }
    if start > total {
        bail!(
            "Invalid page range: start ({}) exceeds total pages ({})",
            start,
            total
        );
    }

    let text = pages[(start - 1) as usize..end as usize].join("\n");
    Ok((text, start, end))
}
