//! # docqa
//!
//! Retrieval-augmented question answering over uploaded documents.
//!
//! An upload (PDF, plain text or DOCX) is extracted, cleaned, split into
//! overlapping chunks, embedded and stored in a vector index. Questions go
//! to a conversational ReAct agent whose one tool retrieves the most similar
//! chunks; the LLM answers from that context and the exchange is kept in an
//! in-memory chat history.

pub mod agent;
pub mod chunking;
pub mod cleaning;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod history;
#[cfg(test)]
pub(crate) mod http_stub;
pub mod llm;
pub mod pipeline;
pub mod response;
pub mod server;
pub mod vector_db;

pub use agent::{AgentOutcome, ConversationalAgent, DocumentRetrieverTool, Tool};
pub use chunking::TextChunker;
pub use cleaning::TextPreprocessor;
pub use config::AppConfig;
pub use document::{DocumentKind, FileProcessor, UploadedFile};
pub use embeddings::{Embedder, HuggingFaceEmbedder};
pub use error::{RagError, Result};
pub use history::{ChatHistory, Speaker};
pub use llm::{ChatModel, GeminiChat};
pub use pipeline::{IngestPipeline, IngestReport};
pub use response::ResponseGenerator;
pub use vector_db::{DocumentIndex, InMemoryStore, PineconeStore, VectorStore};

/// Crate version reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
