//! Embedding generation: provider trait, batching generator, vector utilities.
//!
//! - [`EmbeddingProvider`] is the seam to a concrete backend (OpenAI in the
//!   app crate, [`hashing::HashEmbeddingProvider`] here).
//! - [`EmbeddingGenerator`] validates chunks, batches requests, paces them
//!   through a [`Throttle`], retries transient failures, and keeps usage
//!   counters for cost accounting.
//! - [`vec_to_blob`] / [`blob_to_vec`] and the distance helpers are shared
//!   by the vector stores.
//!
//! Batches are sent one after another so token accounting stays
//! deterministic.

pub mod hashing;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, RagError, Result};
use crate::models::Chunk;
use crate::retry::{call_with_retry, RetryPolicy, Throttle};

/// Largest batch the OpenAI embeddings endpoint accepts.
pub const MAX_BATCH_SIZE: usize = 2048;
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
/// USD per one million tokens for `text-embedding-3-small`.
pub const DEFAULT_PRICE_PER_MILLION_TOKENS: f64 = 0.02;

/// Vectors for one request, in input order, plus the tokens it consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: u64,
}

/// A backend that turns strings into fixed-length vectors.
///
/// One call is one request: implementations do not batch, retry, or
/// throttle. [`EmbeddingGenerator`] does that around them.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Length of every returned vector.
    fn dims(&self) -> usize;
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<EmbeddingBatch, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingOptions {
    /// Texts per request, `1..=2048`.
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub min_request_interval: Duration,
    pub price_per_million_tokens: f64,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            retry: RetryPolicy::default(),
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            price_per_million_tokens: DEFAULT_PRICE_PER_MILLION_TOKENS,
        }
    }
}

impl EmbeddingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(RagError::validation(format!(
                "batch_size must be in 1..={}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.price_per_million_tokens.is_nan() || self.price_per_million_tokens < 0.0 {
            return Err(RagError::validation(
                "price_per_million_tokens must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Cumulative usage since creation or the last [`EmbeddingGenerator::reset_usage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub api_calls: u64,
    pub total_tokens: u64,
    /// USD, rounded to six decimals.
    pub estimated_cost: f64,
    pub model: String,
    pub dims: usize,
}

/// Cost in USD of `tokens` at `price_per_million`, rounded to six decimals.
pub fn estimate_cost(tokens: u64, price_per_million: f64) -> f64 {
    let raw = tokens as f64 / 1_000_000.0 * price_per_million;
    (raw * 1e6).round() / 1e6
}

pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    options: EmbeddingOptions,
    throttle: Throttle,
    api_calls: AtomicU64,
    total_tokens: AtomicU64,
}

impl std::fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("model", &self.provider.model_name())
            .field("dims", &self.provider.dims())
            .field("options", &self.options)
            .finish()
    }
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: EmbeddingOptions) -> Result<Self> {
        options.validate()?;
        info!(
            model = provider.model_name(),
            dims = provider.dims(),
            batch_size = options.batch_size,
            "Initialized embedding generator"
        );
        Ok(Self {
            throttle: Throttle::new(options.min_request_interval),
            provider,
            options,
            api_calls: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        })
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    pub fn options(&self) -> &EmbeddingOptions {
        &self.options
    }

    /// Attach an embedding to every chunk, preserving order.
    ///
    /// Every chunk's text is checked before the first request, so an
    /// empty-text chunk fails the whole call with nothing sent. A failed
    /// batch fails the whole call; no chunk comes back partially embedded.
    pub async fn embed(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        if chunks.is_empty() {
            warn!("No chunks to embed");
            return Ok(chunks);
        }
        if let Some(bad) = chunks.iter().find(|c| c.text.trim().is_empty()) {
            return Err(RagError::integrity(format!(
                "chunk {} has empty text and cannot be embedded",
                bad.id
            )));
        }

        let total_batches = chunks.len().div_ceil(self.options.batch_size);
        info!(
            chunks = chunks.len(),
            batches = total_batches,
            "Generating embeddings"
        );

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for (i, batch) in chunks.chunks(self.options.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            debug!(
                batch = i + 1,
                of = total_batches,
                size = texts.len(),
                "Embedding batch"
            );
            let result = self.request(&texts).await?;
            vectors.extend(result.vectors);
        }

        let usage = self.usage();
        info!(
            chunks = chunks.len(),
            total_tokens = usage.total_tokens,
            estimated_cost = usage.estimated_cost,
            "Embeddings generated"
        );

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| chunk.with_embedding(vector))
            .collect())
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::validation("query text cannot be empty"));
        }
        let mut result = self.request(&[text.to_string()]).await?;
        result
            .vectors
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("no vector returned".into()).into())
    }

    pub fn usage(&self) -> UsageStats {
        let total_tokens = self.total_tokens.load(Ordering::Relaxed);
        UsageStats {
            api_calls: self.api_calls.load(Ordering::Relaxed),
            total_tokens,
            estimated_cost: estimate_cost(total_tokens, self.options.price_per_million_tokens),
            model: self.provider.model_name().to_string(),
            dims: self.provider.dims(),
        }
    }

    pub fn reset_usage(&self) {
        self.api_calls.store(0, Ordering::Relaxed);
        self.total_tokens.store(0, Ordering::Relaxed);
        debug!("Embedding usage counters reset");
    }

    /// One throttled, retried provider call with its response checked.
    async fn request(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        let provider = &self.provider;
        let throttle = &self.throttle;
        let result = call_with_retry(&self.options.retry, ProviderError::is_retryable, || async {
            throttle.wait().await;
            provider.embed_batch(texts).await
        })
        .await?;

        if result.vectors.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                result.vectors.len()
            ))
            .into());
        }
        let dims = self.provider.dims();
        if let Some(v) = result.vectors.iter().find(|v| v.len() != dims) {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {}-dimensional vectors, got {}",
                dims,
                v.len()
            ))
            .into());
        }

        self.api_calls.fetch_add(1, Ordering::Relaxed);
        self.total_tokens
            .fetch_add(result.total_tokens, Ordering::Relaxed);
        Ok(result)
    }
}

/// Encode a float vector as little-endian `f32` bytes for BLOB storage.
///
/// ```rust
/// use doc_rag_core::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![0.5f32, -1.25];
/// assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode bytes written by [`vec_to_blob`]. Trailing partial values are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Squared Euclidean distance, the metric the stores rank by.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum()
}

/// Map a distance to a similarity in `(0, 1]`.
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
