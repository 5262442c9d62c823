//! Hugging Face embedding provider.
//!
//! Generates embeddings with the Hugging Face inference feature-extraction
//! pipeline. Default model: `sentence-transformers/all-MiniLM-L6-v2`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{validate_batch, Embedder, Embedding};
use crate::error::{RagError, Result};

/// Maximum number of inputs sent in one request.
const MAX_BATCH: usize = 32;

const MAX_RETRIES: u32 = 2;

/// Configuration for the Hugging Face embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceEmbedderConfig {
    /// Hugging Face access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model repository id.
    #[serde(default = "default_hf_model")]
    pub model_name: String,
    /// Output dimension of the model.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Override for the feature-extraction endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_hf_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_dimension() -> usize {
    384
}

fn default_timeout() -> u64 {
    60
}

impl Default for HuggingFaceEmbedderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_name: default_hf_model(),
            dimension: default_dimension(),
            endpoint: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Embedder backed by the Hugging Face inference API.
#[derive(Debug, Clone)]
pub struct HuggingFaceEmbedder {
    config: HuggingFaceEmbedderConfig,
    client: reqwest::Client,
}

impl HuggingFaceEmbedder {
    pub fn new(config: HuggingFaceEmbedderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Feature-extraction URL for the configured model.
    pub fn endpoint(&self) -> String {
        self.config.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://router.huggingface.co/hf-inference/models/{}/pipeline/feature-extraction",
                self.config.model_name
            )
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Embedding>> {
        let body = serde_json::json!({
            "inputs": batch,
            "options": { "wait_for_model": true },
        });
        let endpoint = self.endpoint();

        let mut last_error: Option<RagError> = None;
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                log::warn!(
                    "Hugging Face retry attempt {} after {:?}",
                    attempt,
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let mut request = self.client.post(&endpoint).json(&body);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(e.into());
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                last_error = Some(RagError::embedding(format!(
                    "Hugging Face returned {}",
                    status
                )));
                continue;
            }

            let text = response.text().await?;
            if status.is_client_error() {
                return Err(RagError::embedding(format!(
                    "Hugging Face API error ({}): {}",
                    status,
                    truncate(&text, 500)
                )));
            }

            let vectors = parse_vectors(&text)?;
            validate_batch(&vectors, batch.len(), self.config.dimension)?;
            return Ok(vectors);
        }

        Err(last_error.unwrap_or_else(|| {
            RagError::embedding("Hugging Face call failed after all retries")
        }))
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Embedding>> {
        log::debug!(
            "HuggingFace embed_documents (model={}): {} documents",
            self.config.model_name,
            documents.len()
        );
        let mut vectors = Vec::with_capacity(documents.len());
        for batch in documents.chunks(MAX_BATCH) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Decode a feature-extraction response body into one vector per input.
fn parse_vectors(body: &str) -> Result<Vec<Embedding>> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        RagError::embedding(format!(
            "unparseable response: {} - Body: {}",
            e,
            truncate(body, 500)
        ))
    })?;

    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        return Err(RagError::embedding(format!("Hugging Face error: {}", error)));
    }

    serde_json::from_value::<Vec<Embedding>>(value)
        .map_err(|e| RagError::embedding(format!("unexpected response shape: {}", e)))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
