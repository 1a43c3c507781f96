//! Embedding provider abstraction.
//!
//! The sync engine and remote query path only ever see the [`Embedder`]
//! trait: a batch call returning one vector per input in order, plus a
//! single-text variant for queries. Failures surface as classified
//! [`RemoteError`]s so the retry executor can tell transient rate limits
//! from permanent auth or payload problems.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::retry::{retry_after_hint, RemoteError};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, same order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RemoteError>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RemoteError> {
        let vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Api("empty embedding response".to_string()))
    }
}

/// No-op provider used when `[embedding]` is not configured. Every call
/// fails with a configuration error.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RemoteError> {
        Err(RemoteError::Config(
            "embedding provider is disabled; set [embedding] provider in config".to_string(),
        ))
    }
}

/// Embedding provider for OpenAI-compatible `POST /embeddings` endpoints.
///
/// Requires `OPENAI_API_KEY` in the environment. The base URL is
/// configurable so Azure-OpenAI-style deployments work unchanged.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RemoteError> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RemoteError::Config("embedding.model required".to_string()))?;
        let dims = config
            .dims
            .ok_or_else(|| RemoteError::Config("embedding.dims required".to_string()))?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RemoteError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RemoteError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RemoteError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(RemoteError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_hint(response.headers());
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                code: status.as_u16(),
                message,
                retry_after,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Api(format!("invalid embeddings response: {}", e)))?;
        parse_embeddings_response(&json, texts.len())
    }
}

/// Extract `data[].embedding` arrays in input order.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, RemoteError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RemoteError::Api("embeddings response missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let vector = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RemoteError::Api("embeddings response missing embedding".to_string()))?;
        embeddings.push(
            vector
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }

    if embeddings.len() != expected {
        return Err(RemoteError::Api(format!(
            "embeddings response returned {} vectors for {} inputs",
            embeddings.len(),
            expected
        )));
    }

    Ok(embeddings)
}

/// Instantiate the provider selected by configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, RemoteError> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        other => Err(RemoteError::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}
