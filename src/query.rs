//! `docrag query`: retrieve chunks for a question and print the context.

use anyhow::Result;
use std::sync::Arc;

use doc_rag_core::context::ChunkOrdering;
use doc_rag_core::pipeline::{QueryContext, QueryOptions};

use crate::config::Config;
use crate::pipeline::{build_pipeline, open_store};

/// Command-line overrides; `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub top_k: Option<usize>,
    pub min_score: Option<f64>,
    pub source: Option<String>,
    pub max_tokens: Option<usize>,
    pub metadata: bool,
    pub ordering: Option<ChunkOrdering>,
    pub scores: bool,
}

pub fn query_options(config: &Config, args: &QueryArgs) -> QueryOptions {
    let mut retrieve = config.retrieve_options();
    if let Some(top_k) = args.top_k {
        retrieve.top_k = top_k;
    }
    if args.min_score.is_some() {
        retrieve.min_score = args.min_score;
    }
    retrieve.source_filter = args.source.as_deref().map(resolve_source);

    let mut context = config.context_options();
    context.include_metadata |= args.metadata;
    if let Some(ordering) = args.ordering {
        context.ordering = ordering;
    }

    QueryOptions {
        retrieve,
        max_tokens: args.max_tokens.unwrap_or(config.retrieval.max_context_tokens),
        context,
    }
}

/// Sources are stored as canonical paths; accept a relative path too.
pub fn resolve_source(source: &str) -> String {
    std::fs::canonicalize(source)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| source.to_string())
}

pub async fn run_query(config: &Config, query: &str, args: &QueryArgs) -> Result<QueryContext> {
    let options = query_options(config, args);
    let store = Arc::new(open_store(config).await?);
    let pipeline = build_pipeline(config, store.clone())?;

    let answer = pipeline.query_context(query, &options).await;
    store.close().await;
    let answer = answer?;

    if answer.results.is_empty() {
        println!("No results.");
        return Ok(answer);
    }

    if args.scores {
        for (i, result) in answer.results.iter().enumerate() {
            println!(
                "{}. [{:.4}] {}  ({})",
                i + 1,
                result.score,
                result.chunk.id,
                result.chunk.source_document
            );
        }
        println!(
            "-- context: {} chunks, {} tokens{} --",
            answer.context.chunk_count,
            answer.context.token_count,
            if answer.context.truncated {
                ", truncated"
            } else {
                ""
            }
        );
        println!();
    }

    println!("{}", answer.context.context);
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_overrides_apply_over_config() {
        let cfg = parse_config("[retrieval]\ntop_k = 7\nmin_score = 0.1\nmax_context_tokens = 900")
            .unwrap();

        let defaults = query_options(&cfg, &QueryArgs::default());
        assert_eq!(defaults.retrieve.top_k, 7);
        assert_eq!(defaults.retrieve.min_score, Some(0.1));
        assert_eq!(defaults.max_tokens, 900);
        assert!(!defaults.context.include_metadata);

        let args = QueryArgs {
            top_k: Some(2),
            min_score: Some(0.5),
            source: Some("/no/such/file.pdf".to_string()),
            max_tokens: Some(100),
            metadata: true,
            ordering: Some(ChunkOrdering::Position),
            scores: false,
        };
        let opts = query_options(&cfg, &args);
        assert_eq!(opts.retrieve.top_k, 2);
        assert_eq!(opts.retrieve.min_score, Some(0.5));
        assert_eq!(opts.retrieve.source_filter.as_deref(), Some("/no/such/file.pdf"));
        assert_eq!(opts.max_tokens, 100);
        assert!(opts.context.include_metadata);
        assert_eq!(opts.context.ordering, ChunkOrdering::Position);
    }
}
