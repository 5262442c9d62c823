//! Upload ingestion: extract, clean, chunk, embed and index one document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunking::TextChunker;
use crate::cleaning::TextPreprocessor;
use crate::document::{DocumentKind, FileProcessor, UploadedFile};
use crate::error::{RagError, Result};
use crate::vector_db::DocumentIndex;

/// Document id used when the caller does not supply one.
pub const DEFAULT_DOC_ID: &str = "attention";

/// Summary of one ingested upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub ingest_id: Uuid,
    pub file_name: String,
    pub doc_id: String,
    pub kind: DocumentKind,
    /// Characters extracted before cleaning.
    pub raw_chars: usize,
    /// Characters left after cleaning.
    pub cleaned_chars: usize,
    /// Chunks written to the index.
    pub chunks: usize,
    /// SHA-256 of the uploaded bytes, hex encoded.
    pub fingerprint: String,
}

/// Runs an upload through every ingestion stage.
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    processor: FileProcessor,
    preprocessor: TextPreprocessor,
    chunker: TextChunker,
    index: DocumentIndex,
}

impl IngestPipeline {
    pub fn new(chunker: TextChunker, index: DocumentIndex) -> Self {
        Self {
            processor: FileProcessor::new(),
            preprocessor: TextPreprocessor::new(),
            chunker,
            index,
        }
    }

    pub fn index(&self) -> &DocumentIndex {
        &self.index
    }

    /// Ingest `file` under `doc_id`.
    ///
    /// Chunk ids are `<doc_id><n>`, so re-uploading under the same id
    /// overwrites the earlier chunks with matching positions.
    pub async fn process_upload(&self, file: &UploadedFile, doc_id: &str) -> Result<IngestReport> {
        let kind = file.kind().ok_or_else(|| RagError::UnsupportedFileType {
            name: file.name.clone(),
        })?;
        let ingest_id = Uuid::new_v4();
        log::info!(
            "Ingesting '{}' as '{}' (ingest {})",
            file.name,
            doc_id,
            ingest_id
        );

        // PDF extraction is CPU bound.
        let processor = self.processor;
        let upload = file.clone();
        let raw_text = tokio::task::spawn_blocking(move || processor.get_text(&upload))
            .await
            .map_err(|e| RagError::Extraction {
                name: file.name.clone(),
                message: e.to_string(),
            })??;

        let cleaned = self.preprocessor.preprocess_text(&raw_text);
        if cleaned.trim().is_empty() {
            return Err(RagError::EmptyDocument {
                name: file.name.clone(),
            });
        }

        let chunks = self.chunker.chunk_text(&cleaned);
        log::debug!("'{}' split into {} chunks", file.name, chunks.len());
        let stored = self.index.upload_document(&chunks, doc_id).await?;

        let report = IngestReport {
            ingest_id,
            file_name: file.name.clone(),
            doc_id: doc_id.to_string(),
            kind,
            raw_chars: raw_text.chars().count(),
            cleaned_chars: cleaned.chars().count(),
            chunks: stored,
            fingerprint: fingerprint(&file.bytes),
        };
        log::info!(
            "Ingested '{}': {} chunks, fingerprint {}",
            report.file_name,
            report.chunks,
            &report.fingerprint[..12]
        );
        Ok(report)
    }
}

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
