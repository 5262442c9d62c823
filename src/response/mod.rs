//! Turns a user question into an answer and keeps the conversation log.

use std::sync::Arc;

use crate::agent::{AgentOutcome, AgentSettings, ConversationalAgent, DocumentRetrieverTool, Tool};
use crate::error::{RagError, Result};
use crate::history::ChatHistory;
use crate::llm::ChatModel;
use crate::vector_db::DocumentIndex;

/// Wraps the conversational agent and its retrieval tool.
#[derive(Debug, Clone)]
pub struct ResponseGenerator {
    agent: ConversationalAgent,
}

impl ResponseGenerator {
    /// Build an agent whose only tool retrieves `num_results` chunks from `index`.
    pub fn new(
        llm: Arc<dyn ChatModel>,
        index: DocumentIndex,
        num_results: usize,
        settings: AgentSettings,
    ) -> Self {
        let retriever: Arc<dyn Tool> =
            Arc::new(DocumentRetrieverTool::new(index).with_num_results(num_results));
        let agent = ConversationalAgent::new(llm, vec![retriever]).with_settings(settings);
        Self { agent }
    }

    pub fn from_agent(agent: ConversationalAgent) -> Self {
        Self { agent }
    }

    /// Run the agent on `user_input` with the history as it stands before this turn.
    pub async fn get_response(&self, user_input: &str, history: &ChatHistory) -> Result<String> {
        Ok(self.run(user_input, history).await?.answer)
    }

    /// Like [`get_response`](Self::get_response) but keeps the intermediate steps.
    pub async fn run(&self, user_input: &str, history: &ChatHistory) -> Result<AgentOutcome> {
        let question = user_input.trim();
        if question.is_empty() {
            return Err(RagError::invalid_request("question must not be empty"));
        }
        log::info!("Answering question ({} chars)", question.chars().count());
        self.agent.run(question, history).await
    }

    /// Answer and append the exchange to `history`.
    ///
    /// On failure the history is left untouched.
    pub async fn answer(&self, user_input: &str, history: &mut ChatHistory) -> Result<String> {
        let response = self.get_response(user_input, history).await?;
        history.record_exchange(user_input.trim(), response.clone());
        Ok(response)
    }
}
