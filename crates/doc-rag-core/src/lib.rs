//! # doc-rag core
//!
//! The engineering core of doc-rag: chunk model, BPE token accounting,
//! boundary-aware chunking, the embedding index abstractions, retrieval,
//! and token-budgeted context assembly.
//!
//! This crate contains no SQLite, HTTP, or filesystem I/O. Concrete
//! embedding providers and persistent stores live in the `doc-rag` app
//! crate and plug in through the [`embedding::EmbeddingProvider`] and
//! [`store::VectorStore`] traits.
//!
//! ## Data Flow
//!
//! ```text
//! document text ──▶ chunk ──▶ EmbeddingGenerator ──▶ VectorStore (once)
//!
//! query ──▶ Retriever ──▶ ranked chunks ──▶ context ──▶ bounded string
//! ```

pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod retry;
pub mod store;
pub mod tokenizer;

pub use error::{ProviderError, RagError, Result};
