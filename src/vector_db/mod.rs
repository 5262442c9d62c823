//! Vector storage and similarity retrieval.
//!
//! [`VectorStore`] abstracts the index backend (managed Pinecone index or a
//! process-local one). [`DocumentIndex`] pairs a store with an [`Embedder`]
//! and exposes the two operations the rest of the service needs: uploading
//! a document's chunks and fetching the chunks most similar to a query.

pub mod memory;
pub mod pinecone;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::embeddings::Embedder;
use crate::error::{RagError, Result};

pub use memory::InMemoryStore;
pub use pinecone::{PineconeConfig, PineconeStore};

/// Metadata key holding a chunk's text.
pub const TEXT_METADATA_KEY: &str = "text";

/// Number of chunks returned when the caller does not ask for a count.
pub const DEFAULT_NUM_RESULTS: usize = 4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A vector with its id and metadata, as stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A query hit. Higher scores are more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ScoredMatch {
    /// The chunk text stored alongside the vector, if any.
    pub fn text(&self) -> Option<&str> {
        self.metadata.get(TEXT_METADATA_KEY).and_then(|v| v.as_str())
    }
}

/// Similarity metric of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    Dotproduct,
}

/// Shape and placement of the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
}

impl Default for IndexSpec {
    fn default() -> Self {
        Self {
            name: "quickstart".to_string(),
            dimension: 384,
            metric: Metric::Cosine,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// VectorStore
// ---------------------------------------------------------------------------

/// Backend storing vectors and answering nearest-neighbour queries.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the index if it does not exist yet.
    async fn ensure_index(&self) -> Result<()>;

    /// Insert or overwrite records by id.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Return up to `top_k` records ordered by descending similarity.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredMatch>>;

    /// Remove every stored vector.
    async fn reset(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DocumentIndex
// ---------------------------------------------------------------------------

/// Embeds text and stores/retrieves it through a [`VectorStore`].
#[derive(Clone)]
pub struct DocumentIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("embedding_model", &self.embedder.model_name())
            .finish()
    }
}

impl DocumentIndex {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Create the backing index if needed.
    pub async fn connect(&self) -> Result<()> {
        self.store.ensure_index().await
    }

    pub async fn get_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed_query(text).await
    }

    /// Embed and upsert a document's chunks.
    ///
    /// Chunk `n` is stored under the id `"{doc_id}{n}"` with its text in the
    /// `text` metadata field. Uploading again under the same doc id
    /// overwrites the matching ids.
    pub async fn upload_document(&self, chunks: &[String], doc_id: &str) -> Result<usize> {
        if chunks.is_empty() {
            log::debug!("No chunks to upload for '{}'", doc_id);
            return Ok(0);
        }

        let vectors = self.embedder.embed_documents(chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::embedding(format!(
                "got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(n, (text, values))| {
                let mut metadata = Map::new();
                metadata.insert(TEXT_METADATA_KEY.to_string(), Value::String(text.clone()));
                VectorRecord {
                    id: format!("{}{}", doc_id, n),
                    values,
                    metadata,
                }
            })
            .collect();

        let count = self.store.upsert(records).await?;
        log::info!("Upserted {} chunks under doc id '{}'", count, doc_id);
        Ok(count)
    }

    /// Texts of the `num_results` chunks most similar to `query_text`.
    pub async fn get_similar_documents(
        &self,
        query_text: &str,
        num_results: usize,
    ) -> Result<Vec<String>> {
        let query_embedding = self.get_embedding(query_text).await?;
        let matches = self.store.query(&query_embedding, num_results).await?;
        log::debug!(
            "Query '{}' matched {} chunks",
            query_text,
            matches.len()
        );
        Ok(matches
            .iter()
            .filter_map(|m| m.text().map(str::to_string))
            .collect())
    }

    /// Drop every stored chunk.
    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::LetterEmbedder;
    use super::*;

    fn index() -> (DocumentIndex, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new(26));
        let index = DocumentIndex::new(Arc::new(LetterEmbedder), store.clone());
        (index, store)
    }

    #[tokio::test]
    async fn test_upload_assigns_prefixed_ids() {
        let (index, store) = index();
        let chunks = vec!["zzz".to_string(), "aaa".to_string()];
        let count = index.upload_document(&chunks, "attention").await.unwrap();
        assert_eq!(count, 2);

        let mut ids = store.ids();
        ids.sort();
        assert_eq!(ids, vec!["attention0", "attention1"]);
    }

    #[tokio::test]
    async fn test_upload_empty_is_noop() {
        let (index, store) = index();
        assert_eq!(index.upload_document(&[], "doc").await.unwrap(), 0);
        assert!(store.ids().is_empty());
    }

    #[tokio::test]
    async fn test_similar_documents_ranked() {
        let (index, _) = index();
        let chunks = vec![
            "xyz xyz".to_string(),
            "attention heads".to_string(),
            "qqq".to_string(),
        ];
        index.upload_document(&chunks, "doc").await.unwrap();

        let docs = index.get_similar_documents("attention", 2).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0], "attention heads");
    }

    #[tokio::test]
    async fn test_reupload_overwrites() {
        let (index, store) = index();
        index
            .upload_document(&["old text".to_string()], "doc")
            .await
            .unwrap();
        index
            .upload_document(&["new text".to_string()], "doc")
            .await
            .unwrap();
        assert_eq!(store.ids(), vec!["doc0"]);
        let docs = index.get_similar_documents("text", 4).await.unwrap();
        assert_eq!(docs, vec!["new text"]);
    }

    #[test]
    fn test_scored_match_text() {
        let mut metadata = Map::new();
        metadata.insert("text".into(), Value::String("chunk".into()));
        let m = ScoredMatch {
            id: "a0".into(),
            score: 0.9,
            metadata,
        };
        assert_eq!(m.text(), Some("chunk"));
    }
}
