//! Error types for the document Q&A pipeline.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RagError>;

/// Every failure the ingestion and question-answering paths can produce.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration value is missing or malformed.
    #[error("Configuration error ({key}): {message}")]
    Config { key: String, message: String },

    /// The uploaded file type is not one we can extract text from.
    #[error("Unsupported file type: {name}")]
    UnsupportedFileType { name: String },

    /// The upload (or the text extracted from it) is empty.
    #[error("Document '{name}' contains no extractable text")]
    EmptyDocument { name: String },

    /// The extractor failed on a corrupt or unreadable file.
    #[error("Failed to extract text from '{name}': {message}")]
    Extraction { name: String, message: String },

    /// Chunk size / overlap combination is unusable.
    #[error("Invalid chunk configuration: {message}")]
    InvalidChunkConfig { message: String },

    /// The embedding service failed or returned malformed vectors.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// The vector index rejected a request or was unreachable.
    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    /// The language model call failed.
    #[error("LLM error: {message}")]
    Llm { message: String },

    /// The agent could not complete a run.
    #[error("Agent error: {message}")]
    Agent { message: String },

    /// Caller supplied an unusable request (blank question, bad form).
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Transport-level HTTP failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// JSON encoding/decoding failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The HTML page template failed to load or render.
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

impl RagError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Whether the failure was caused by the caller rather than an upstream service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RagError::UnsupportedFileType { .. }
                | RagError::EmptyDocument { .. }
                | RagError::Extraction { .. }
                | RagError::InvalidRequest { .. }
        )
    }
}
