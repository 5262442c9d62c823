//! Tools the agent can call.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::vector_db::{DocumentIndex, DEFAULT_NUM_RESULTS};

/// Observation returned when retrieval finds nothing.
pub const NO_DOCUMENTS_FOUND: &str = "No relevant documents found.";

/// A named capability the agent can invoke with a text input.
#[async_trait]
pub trait Tool: Send + Sync + fmt::Debug {
    /// Name the model uses in `Action:` lines.
    fn name(&self) -> &str;

    /// Description used to tell the model when to use the tool.
    fn description(&self) -> &str;

    /// Run the tool and return its observation.
    async fn run(&self, input: &str) -> Result<String>;
}

/// Looks up document chunks similar to the input.
#[derive(Debug, Clone)]
pub struct DocumentRetrieverTool {
    index: DocumentIndex,
    num_results: usize,
}

impl DocumentRetrieverTool {
    pub const NAME: &'static str = "Document Retriever";
    pub const DESCRIPTION: &'static str = "Retrieves documents related to the query.";

    pub fn new(index: DocumentIndex) -> Self {
        Self {
            index,
            num_results: DEFAULT_NUM_RESULTS,
        }
    }

    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results;
        self
    }
}

#[async_trait]
impl Tool for DocumentRetrieverTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        Self::DESCRIPTION
    }

    async fn run(&self, input: &str) -> Result<String> {
        let documents = self
            .index
            .get_similar_documents(input, self.num_results)
            .await?;
        if documents.is_empty() {
            return Ok(NO_DOCUMENTS_FOUND.to_string());
        }
        Ok(documents.join("\n\n"))
    }
}
