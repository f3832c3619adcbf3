//! # doc-rag
//!
//! Retrieval-augmented context for local documents.
//!
//! doc-rag splits PDF, Markdown, and plain-text documents into
//! overlap-padded chunks, embeds them once, stores the vectors in SQLite,
//! and answers queries with a token-budgeted context string built from the
//! most similar chunks. The engineering core (chunking, token accounting,
//! retrieval, context assembly) lives in the `doc-rag-core` crate; this
//! crate adds configuration, document loading, the OpenAI provider, the
//! SQLite store, and the `docrag` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Documents  │──▶│   Pipeline   │──▶│  SQLite  │
//! │ PDF/MD/TXT  │   │ Chunk+Embed  │   │  chunks  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                                           ▼
//!                  query ──▶ Retriever ──▶ context
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docrag init
//! docrag index ./papers/attention.pdf --start-page 1 --end-page 12
//! docrag query "how is attention scaled?" --max-tokens 2000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`source`] | Loading PDF and text documents |
//! | [`embedding`] | OpenAI provider and provider selection |
//! | [`sqlite_store`] | Persistent vector store |
//! | [`pipeline`] | Wiring configuration into a pipeline |
//! | [`ingest`] | `chunk` and `index` commands |
//! | [`query`] | `query` command |
//! | [`get`] | `get` command |
//! | [`sources`] | `sources`, `count`, `delete`, `clear` commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod pipeline;
pub mod query;
pub mod source;
pub mod sources;
pub mod sqlite_store;
