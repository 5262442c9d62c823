//! HTTP server: a server-rendered page for people and a small JSON API.
//!
//! # Endpoints
//!
//! - `GET  /`                   — Upload and question forms with the chat history
//! - `POST /upload`, `POST /ask` — Form targets for the page
//! - `/api/*`                   — JSON equivalents
//! - `GET  /health`             — Liveness probe

pub mod routes;
pub mod views;

use std::sync::Arc;

pub use routes::{app_router, AppState};

use crate::agent::AgentSettings;
use crate::chunking::TextChunker;
use crate::config::{AppConfig, VectorBackend};
use crate::embeddings::{Embedder, HuggingFaceEmbedder, HuggingFaceEmbedderConfig};
use crate::error::{RagError, Result};
use crate::llm::{ChatModel, GeminiChat, GeminiConfig};
use crate::pipeline::IngestPipeline;
use crate::response::ResponseGenerator;
use crate::vector_db::{
    DocumentIndex, InMemoryStore, IndexSpec, Metric, PineconeConfig, PineconeStore, VectorStore,
};

/// Wire the embedder, vector store, LLM and agent described by `config`.
///
/// Creates the Pinecone index when it does not exist yet.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let embedder: Arc<dyn Embedder> = Arc::new(HuggingFaceEmbedder::new(
        HuggingFaceEmbedderConfig {
            api_key: config.hf_api_key.clone(),
            model_name: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            endpoint: config.embedding_url.clone(),
            ..Default::default()
        },
    )?);

    let store: Arc<dyn VectorStore> = match config.vector_backend {
        VectorBackend::Pinecone => {
            let api_key = config
                .pinecone_api_key
                .clone()
                .ok_or_else(|| RagError::config("PINECONE_API_KEY", "not set"))?;
            let spec = IndexSpec {
                name: config.index_name.clone(),
                dimension: config.embedding_dimension,
                metric: Metric::Cosine,
                cloud: config.pinecone_cloud.clone(),
                region: config.pinecone_region.clone(),
            };
            let pinecone = PineconeConfig::new(api_key, spec)
                .with_namespace(config.pinecone_namespace.clone());
            Arc::new(PineconeStore::new(pinecone)?)
        }
        VectorBackend::Memory => {
            log::warn!("Using the in-memory vector store; uploads are lost on restart");
            Arc::new(InMemoryStore::new(config.embedding_dimension))
        }
    };

    let index = DocumentIndex::new(embedder, store);
    index.connect().await?;

    let llm: Arc<dyn ChatModel> = Arc::new(GeminiChat::new(GeminiConfig {
        model: config.llm_model.clone(),
        api_key: config.google_api_key.clone(),
        temperature: config.llm_temperature,
        ..Default::default()
    })?);
    if config.google_api_key.is_none() {
        log::warn!("GOOGLE_API_KEY is not set; questions will fail until it is");
    }

    let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
    let pipeline = IngestPipeline::new(chunker, index.clone());
    let responder = ResponseGenerator::new(
        llm,
        index,
        config.top_k,
        AgentSettings {
            max_iterations: config.agent_max_iterations,
            verbose: config.agent_verbose,
        },
    );

    Ok(AppState::new(pipeline, responder)?
        .with_doc_id(config.doc_id.clone())
        .with_max_upload_bytes(config.max_upload_bytes))
}
