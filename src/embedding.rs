//! Concrete embedding providers and provider selection.
//!
//! - **[`OpenAIProvider`]**: `POST {url}/embeddings` on any
//!   OpenAI-compatible API, one request per call.
//! - **`hash`**: the offline [`HashEmbeddingProvider`] from the core crate.
//!
//! Batching, throttling and retry live in the core
//! [`EmbeddingGenerator`](doc_rag_core::embedding::EmbeddingGenerator);
//! this module only maps one HTTP exchange onto a [`ProviderError`]
//! category:
//!
//! | Outcome | Category | Retried |
//! |---------|----------|---------|
//! | 401, 403 | `Authentication` | no |
//! | 429 | `RateLimited` | yes |
//! | 5xx | `Server` | yes |
//! | other 4xx | `BadRequest` | no |
//! | transport error, timeout | `Connection` | yes |
//! | unparsable body | `InvalidResponse` | no |

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use doc_rag_core::embedding::hashing::HashEmbeddingProvider;
use doc_rag_core::embedding::{EmbeddingBatch, EmbeddingProvider};
use doc_rag_core::ProviderError;

use crate::config::EmbeddingConfig;

/// Embedding provider for the OpenAI embeddings API.
///
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!("OPENAI_API_KEY environment variable not set"),
        };
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", config.url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), body_text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        parse_openai_response(&json)
    }
}

/// Map a non-success HTTP status onto a provider error category.
pub fn classify_status(status: u16, message: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Authentication(message),
        429 => ProviderError::RateLimited(message),
        500..=599 => ProviderError::Server { status, message },
        _ => ProviderError::BadRequest { status, message },
    }
}

/// Parse an embeddings response body.
///
/// Vectors are returned in input order, sorted by `data[].index`.
pub fn parse_openai_response(json: &serde_json::Value) -> Result<EmbeddingBatch, ProviderError> {
    let invalid = |msg: &str| ProviderError::InvalidResponse(msg.to_string());

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (fallback, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(fallback);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("missing embedding"))?;
        let vector = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| invalid("non-numeric embedding value"))?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    let total_tokens = json
        .get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(|t| t.as_u64())
        .unwrap_or(0);

    Ok(EmbeddingBatch {
        vectors: indexed.into_iter().map(|(_, v)| v).collect(),
        total_tokens,
    })
}

/// Instantiate the provider named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"hash"` | [`HashEmbeddingProvider`] |
/// | `"disabled"` | error |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "hash" => Ok(Arc::new(HashEmbeddingProvider::new(config.dims))),
        "disabled" => bail!(
            "Embedding provider is disabled. Set [embedding].provider to \"openai\" or \"hash\"."
        ),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(401, "no".into()),
            ProviderError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(403, "no".into()),
            ProviderError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(429, "slow".into()),
            ProviderError::RateLimited(_)
        ));
        assert_eq!(
            classify_status(503, "down".into()),
            ProviderError::Server {
                status: 503,
                message: "down".into()
            }
        );
        let bad = classify_status(400, "too long".into());
        assert!(matches!(bad, ProviderError::BadRequest { status: 400, .. }));
        assert!(!bad.is_retryable());
    }

    #[test]
    fn test_parse_reorders_by_index() {
        let body = json!({
            "data": [
                {"index": 1, "embedding": [0.5, 0.5]},
                {"index": 0, "embedding": [1.0, -1.0]}
            ],
            "usage": {"prompt_tokens": 12, "total_tokens": 12}
        });
        let batch = parse_openai_response(&body).unwrap();
        assert_eq!(batch.vectors, vec![vec![1.0, -1.0], vec![0.5, 0.5]]);
        assert_eq!(batch.total_tokens, 12);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            parse_openai_response(&json!({"object": "list"})),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_openai_response(&json!({"data": [{"index": 0}]})),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_openai_response(&json!({"data": [{"embedding": ["x"]}]})),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_create_provider() {
        let hash = EmbeddingConfig {
            provider: "hash".to_string(),
            dims: 32,
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&hash).unwrap();
        assert_eq!(provider.dims(), 32);
        assert_eq!(provider.model_name(), "hash-bow");

        let disabled = EmbeddingConfig {
            provider: "disabled".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&disabled).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let config = EmbeddingConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 5,
            ..EmbeddingConfig::default()
        };
        let provider = OpenAIProvider::with_api_key(&config, "sk-test").unwrap();
        let err = provider
            .embed_batch(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Connection(_)));
        assert!(err.is_retryable());
    }
}
