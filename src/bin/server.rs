//! docqa HTTP server binary.
//!
//! Serves the upload/question page and the JSON API.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `VECTOR_STORE` — "pinecone" (default) or "memory"
//! - `PINECONE_API_KEY` — required for the pinecone backend
//! - `GOOGLE_API_KEY` — Gemini key used to answer questions
//! - `HF_API_KEY` — optional Hugging Face token for embeddings
//! - `RUST_LOG` — Tracing filter (default: "info,docqa=debug")
//!
//! A `.env` file in the working directory is loaded first.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! # without Pinecone:
//! VECTOR_STORE=memory cargo run --bin server
//! ```

use anyhow::Context;
use docqa::config::AppConfig;
use docqa::server::{app_router, build_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,docqa=debug".into()),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.socket_addr();

    tracing::info!(
        "Connecting to {:?} index '{}' ({} dims)",
        config.vector_backend,
        config.index_name,
        config.embedding_dimension
    );
    let state = build_state(&config)
        .await
        .context("failed to initialise the document index")?;

    let app = app_router(state);

    tracing::info!("docqa {} starting on {}", docqa::VERSION, bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /             — upload and question page");
    tracing::info!("  POST /api/documents — ingest a document");
    tracing::info!("  POST /api/ask      — ask a question");
    tracing::info!("  GET  /health       — liveness probe");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
