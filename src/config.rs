//! TOML configuration.
//!
//! Every section is optional; missing keys take the defaults below.
//! [`load_config`] parses and validates in one step so commands can
//! assume a consistent configuration.
//!
//! ```toml
//! [store]
//! path = "./data/docrag.sqlite"
//!
//! [chunking]
//! target_tokens = 800
//! overlap_tokens = 100
//! max_tokens = 1200
//!
//! [embedding]
//! provider = "openai"   # openai | hash | disabled
//!
//! [retrieval]
//! top_k = 5
//! max_context_tokens = 4000
//! ```
//!
//! The OpenAI API key comes from `OPENAI_API_KEY`, never from this file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use doc_rag_core::chunk::ChunkParams;
use doc_rag_core::context::{ChunkOrdering, ContextOptions, DEFAULT_SEPARATOR};
use doc_rag_core::embedding::{EmbeddingOptions, MAX_BATCH_SIZE};
use doc_rag_core::retrieval::RetrieveOptions;
use doc_rag_core::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/docrag.sqlite")
}
fn default_collection() -> String {
    "docrag_chunks".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_target_tokens() -> usize {
    800
}
fn default_overlap_tokens() -> usize {
    100
}
fn default_max_tokens() -> usize {
    1200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Total attempts per request, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    #[serde(default = "default_price")]
    pub price_per_million_tokens: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: default_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            min_request_interval_ms: default_min_request_interval_ms(),
            price_per_million_tokens: default_price(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_min_request_interval_ms() -> u64 {
    100
}
fn default_price() -> f64 {
    0.02
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default)]
    pub ordering: ChunkOrdering,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
            max_context_tokens: default_max_context_tokens(),
            include_metadata: false,
            ordering: ChunkOrdering::default(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_context_tokens() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams::new(
            self.chunking.target_tokens,
            self.chunking.overlap_tokens,
            self.chunking.max_tokens,
        )
    }

    pub fn embedding_options(&self) -> EmbeddingOptions {
        EmbeddingOptions {
            batch_size: self.embedding.batch_size,
            retry: RetryPolicy::new(self.embedding.max_retries),
            min_request_interval: Duration::from_millis(self.embedding.min_request_interval_ms),
            price_per_million_tokens: self.embedding.price_per_million_tokens,
        }
    }

    pub fn retrieve_options(&self) -> RetrieveOptions {
        RetrieveOptions {
            top_k: self.retrieval.top_k,
            source_filter: None,
            min_score: self.retrieval.min_score,
        }
    }

    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            separator: DEFAULT_SEPARATOR.to_string(),
            include_metadata: self.retrieval.include_metadata,
            ordering: self.retrieval.ordering,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.store.collection.trim().is_empty() {
        bail!("store.collection must not be empty");
    }

    let chunking = &config.chunking;
    if chunking.target_tokens == 0 {
        bail!("chunking.target_tokens must be > 0");
    }
    if chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if chunking.overlap_tokens >= chunking.target_tokens {
        bail!(
            "chunking.overlap_tokens ({}) must be less than chunking.target_tokens ({})",
            chunking.overlap_tokens,
            chunking.target_tokens
        );
    }

    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "openai" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai, hash, or disabled.",
            other
        ),
    }
    if embedding.is_enabled() {
        if embedding.dims == 0 {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.model.trim().is_empty() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }
    if embedding.batch_size == 0 || embedding.batch_size > MAX_BATCH_SIZE {
        bail!("embedding.batch_size must be in 1..={}", MAX_BATCH_SIZE);
    }
    if embedding.max_retries == 0 {
        bail!("embedding.max_retries must be >= 1");
    }
    if embedding.price_per_million_tokens.is_nan() || embedding.price_per_million_tokens < 0.0 {
        bail!("embedding.price_per_million_tokens must be >= 0");
    }

    let retrieval = &config.retrieval;
    if retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if let Some(min) = retrieval.min_score {
        if !(0.0..=1.0).contains(&min) {
            bail!("retrieval.min_score must be in [0.0, 1.0]");
        }
    }
    if retrieval.max_context_tokens == 0 {
        bail!("retrieval.max_context_tokens must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.store.collection, "docrag_chunks");
        assert_eq!(cfg.chunk_params(), ChunkParams::new(800, 100, 1200));
        assert_eq!(cfg.embedding.provider, "openai");
        assert_eq!(cfg.embedding.dims, 1536);
        assert_eq!(cfg.embedding.batch_size, 2048);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert_eq!(cfg.retrieval.min_score, None);
        assert_eq!(cfg.retrieval.ordering, ChunkOrdering::Relevance);
        assert_eq!(cfg.logging.level, "info");

        let opts = cfg.embedding_options();
        assert_eq!(opts.retry.max_attempts, 3);
        assert_eq!(opts.min_request_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_overrides() {
        let cfg = parse_config(
            r#"
[store]
path = "/tmp/x.sqlite"
collection = "papers"

[chunking]
target_tokens = 300
overlap_tokens = 30
max_tokens = 500

[embedding]
provider = "hash"
dims = 64

[retrieval]
top_k = 3
min_score = 0.25
include_metadata = true
ordering = "position"
"#,
        )
        .unwrap();
        assert_eq!(cfg.store.path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(cfg.chunk_params(), ChunkParams::new(300, 30, 500));
        assert_eq!(cfg.embedding.provider, "hash");
        assert_eq!(cfg.retrieve_options().min_score, Some(0.25));
        let ctx = cfg.context_options();
        assert!(ctx.include_metadata);
        assert_eq!(ctx.ordering, ChunkOrdering::Position);
    }

    #[test]
    fn test_validation_errors_name_the_key() {
        let cases = [
            ("[chunking]\ntarget_tokens = 100\noverlap_tokens = 100", "overlap_tokens"),
            ("[chunking]\nmax_tokens = 0", "max_tokens"),
            ("[embedding]\nprovider = \"cohere\"", "Unknown embedding provider"),
            ("[embedding]\nbatch_size = 5000", "batch_size"),
            ("[retrieval]\ntop_k = 0", "top_k"),
            ("[retrieval]\nmin_score = 1.5", "min_score"),
            ("[retrieval]\nordering = \"random\"", "parse"),
        ];
        for (toml_text, needle) in cases {
            let err = parse_config(toml_text).unwrap_err();
            assert!(
                format!("{:#}", err).contains(needle),
                "{:?} should mention {:?}, got {:#}",
                toml_text,
                needle,
                err
            );
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = parse_config(include_str!("../config/docrag.example.toml")).unwrap();
        assert_eq!(cfg.store.collection, "docrag_chunks");
        assert_eq!(cfg.embedding.model, "text-embedding-3-small");
    }
}
