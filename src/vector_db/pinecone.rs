//! Pinecone serverless index client (REST).
//!
//! The control plane lists and creates indexes; each index then exposes its
//! own data-plane host for upserts and queries. The host is resolved once
//! and cached.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{IndexSpec, ScoredMatch, VectorRecord, VectorStore};
use crate::error::{RagError, Result};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// Upsert requests carry at most this many vectors.
const UPSERT_BATCH_SIZE: usize = 100;

/// How many times to poll a freshly created index before giving up.
const READY_POLL_ATTEMPTS: u32 = 30;

/// Connection settings for a Pinecone project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(default)]
    pub index: IndexSpec,
    /// Namespace all vectors are written to and read from.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_control_plane")]
    pub control_plane_url: String,
}

fn default_control_plane() -> String {
    CONTROL_PLANE_URL.to_string()
}

impl PineconeConfig {
    pub fn new(api_key: impl Into<String>, index: IndexSpec) -> Self {
        Self {
            api_key: api_key.into(),
            index,
            namespace: None,
            control_plane_url: default_control_plane(),
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredMatch>,
}

// ---------------------------------------------------------------------------
// PineconeStore
// ---------------------------------------------------------------------------

/// [`VectorStore`] backed by a Pinecone serverless index.
#[derive(Debug)]
pub struct PineconeStore {
    config: PineconeConfig,
    client: reqwest::Client,
    host: RwLock<Option<String>>,
}

impl PineconeStore {
    pub fn new(config: PineconeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            config,
            client,
            host: RwLock::new(None),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.config.index.name
    }

    fn control_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.control_plane_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    /// The data-plane base URL, resolving it on first use.
    async fn data_url(&self, path: &str) -> Result<String> {
        let cached = self.host.read().clone();
        let host = match cached {
            Some(host) => host,
            None => {
                let host = self.wait_until_ready().await?;
                *self.host.write() = Some(host.clone());
                host
            }
        };
        Ok(data_plane_url(&host, path))
    }

    async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let response = self
            .request(reqwest::Method::GET, &self.control_url("indexes"))
            .send()
            .await?;
        let list: IndexList = read_json(response, "list indexes").await?;
        Ok(list.indexes)
    }

    async fn create_index(&self) -> Result<()> {
        let spec = &self.config.index;
        let body = create_index_body(spec);
        log::info!(
            "Creating Pinecone index '{}' (dimension={}, cloud={}, region={})",
            spec.name,
            spec.dimension,
            spec.cloud,
            spec.region
        );
        let response = self
            .request(reqwest::Method::POST, &self.control_url("indexes"))
            .json(&body)
            .send()
            .await?;
        // Another process may have created it in the meantime.
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        let _: Value = read_json(response, "create index").await?;
        Ok(())
    }

    async fn describe_index(&self) -> Result<IndexDescription> {
        let url = self.control_url(&format!("indexes/{}", self.config.index.name));
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        read_json(response, "describe index").await
    }

    async fn wait_until_ready(&self) -> Result<String> {
        for attempt in 0..READY_POLL_ATTEMPTS {
            let description = self.describe_index().await?;
            let ready = description.status.as_ref().map_or(false, |s| s.ready);
            if let (true, Some(host)) = (ready, description.host) {
                return Ok(host);
            }
            log::debug!(
                "Index '{}' not ready yet (attempt {})",
                description.name,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Err(RagError::vector_store(format!(
            "index '{}' did not become ready",
            self.config.index.name
        )))
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn ensure_index(&self) -> Result<()> {
        let exists = self
            .list_indexes()
            .await?
            .iter()
            .any(|i| i.name == self.config.index.name);
        if !exists {
            self.create_index().await?;
        }
        let host = self.wait_until_ready().await?;
        log::info!(
            "Connected to Pinecone index '{}' at {}",
            self.config.index.name,
            host
        );
        *self.host.write() = Some(host);
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let url = self.data_url("vectors/upsert").await?;
        let namespace = self.config.namespace.as_deref();
        let batches = records.chunks(UPSERT_BATCH_SIZE).map(|batch| {
            let request = self.request(reqwest::Method::POST, &url).json(&UpsertRequest {
                vectors: batch,
                namespace,
            });
            async move {
                let response = request.send().await?;
                let result: UpsertResponse = read_json(response, "upsert").await?;
                Ok::<usize, RagError>(result.upserted_count)
            }
        });
        let counts = futures::future::try_join_all(batches).await?;
        Ok(counts.into_iter().sum())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>> {
        let url = self.data_url("query").await?;
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&QueryRequest {
                vector,
                top_k,
                include_metadata: true,
                include_values: false,
                namespace: self.config.namespace.as_deref(),
            })
            .send()
            .await?;
        let result: QueryResponse = read_json(response, "query").await?;
        Ok(result.matches)
    }

    async fn reset(&self) -> Result<()> {
        let url = self.data_url("vectors/delete").await?;
        let mut body = serde_json::json!({ "deleteAll": true });
        if let Some(ns) = &self.config.namespace {
            body["namespace"] = Value::String(ns.clone());
        }
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await?;
        // An empty namespace reports 404 on serverless indexes.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: Value = read_json(response, "delete all").await?;
        Ok(())
    }
}

fn create_index_body(spec: &IndexSpec) -> Value {
    serde_json::json!({
        "name": spec.name,
        "dimension": spec.dimension,
        "metric": spec.metric,
        "spec": {
            "serverless": {
                "cloud": spec.cloud,
                "region": spec.region,
            }
        }
    })
}

fn data_plane_url(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}/{}", host, path)
    } else {
        format!("https://{}/{}", host, path)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(RagError::vector_store(format!(
            "Pinecone {} failed ({}): {}",
            operation, status, text
        )));
    }
    // Some endpoints answer with an empty body.
    let text = if text.trim().is_empty() { "{}" } else { &text };
    serde_json::from_str(text).map_err(|e| {
        RagError::vector_store(format!("Pinecone {} returned bad JSON: {}", operation, e))
    })
}
