//! # doc-rag CLI (`docrag`)
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./config/docrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag init` | Create the SQLite store and run schema migrations |
//! | `docrag chunk <path>` | Preview how a document would be chunked |
//! | `docrag index <path>` | Chunk, embed, and store a document |
//! | `docrag query "<text>"` | Print the context for a query |
//! | `docrag get <id>` | Print one stored chunk |
//! | `docrag sources` | List indexed documents |
//! | `docrag count` | Number of stored chunks |
//! | `docrag delete <path>` | Remove one document's chunks |
//! | `docrag clear` | Remove every chunk in the collection |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use doc_rag::config::{self, Config};
use doc_rag::query::QueryArgs;
use doc_rag::{db, get, ingest, migrate, query, sources};
use doc_rag_core::context::ChunkOrdering;

/// doc-rag: retrieval-augmented context for local documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "Chunk, embed, and query local documents for LLM context",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store schema. Safe to run repeatedly.
    Init,

    /// Show how a document would be chunked, without embedding or storing.
    Chunk {
        /// PDF, Markdown, or text file.
        path: PathBuf,

        /// First page to read (1-indexed).
        #[arg(long, default_value_t = 1)]
        start_page: u32,

        /// Last page to read, inclusive. Defaults to the last page.
        #[arg(long)]
        end_page: Option<u32>,

        /// Print full chunk text instead of a preview.
        #[arg(long)]
        full: bool,
    },

    /// Chunk, embed, and store a document, replacing any earlier version.
    Index {
        /// PDF, Markdown, or text file.
        path: PathBuf,

        /// First page to read (1-indexed).
        #[arg(long, default_value_t = 1)]
        start_page: u32,

        /// Last page to read, inclusive. Defaults to the last page.
        #[arg(long)]
        end_page: Option<u32>,
    },

    /// Retrieve the chunks most similar to a query and print the context.
    Query {
        /// The query text.
        query: String,

        /// Number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,

        /// Drop results scoring below this value.
        #[arg(long)]
        min_score: Option<f64>,

        /// Only search chunks from this document.
        #[arg(long)]
        source: Option<String>,

        /// Token budget for the assembled context.
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Prefix each chunk with its source and pages.
        #[arg(long)]
        metadata: bool,

        /// Chunk order in the context: `relevance` or `position`.
        #[arg(long)]
        ordering: Option<ChunkOrdering>,

        /// Print ranked scores before the context.
        #[arg(long)]
        scores: bool,
    },

    /// Print a stored chunk by id.
    Get {
        /// Chunk id, e.g. `attention_chunk_003`.
        id: String,
    },

    /// List indexed documents.
    Sources,

    /// Print the number of stored chunks.
    Count,

    /// Remove every chunk of one document.
    Delete {
        /// Document path as it was indexed.
        source: String,
    },

    /// Remove every chunk in the collection.
    Clear,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.store.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Store initialized at {}", cfg.store.path.display());
        }
        Commands::Chunk {
            path,
            start_page,
            end_page,
            full,
        } => {
            ingest::run_chunk(&cfg, &path, start_page, end_page, full)?;
        }
        Commands::Index {
            path,
            start_page,
            end_page,
        } => {
            ingest::run_index(&cfg, &path, start_page, end_page).await?;
        }
        Commands::Query {
            query: text,
            top_k,
            min_score,
            source,
            max_tokens,
            metadata,
            ordering,
            scores,
        } => {
            let args = QueryArgs {
                top_k,
                min_score,
                source,
                max_tokens,
                metadata,
                ordering,
                scores,
            };
            query::run_query(&cfg, &text, &args).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Count => {
            sources::run_count(&cfg).await?;
        }
        Commands::Delete { source } => {
            sources::run_delete(&cfg, &source).await?;
        }
        Commands::Clear => {
            sources::run_clear(&cfg).await?;
        }
    }

    Ok(())
}
