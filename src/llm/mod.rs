//! Chat-completion models.
//!
//! [`ChatModel`] is the seam the agent talks to; [`GeminiChat`] is the
//! production implementation.

pub mod gemini;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use gemini::{GeminiChat, GeminiConfig};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A text-in, text-out language model.
#[async_trait]
pub trait ChatModel: Send + Sync + fmt::Debug {
    /// Model identifier.
    fn model(&self) -> &str;

    /// Generate the assistant's reply. Output is cut at the first stop sequence.
    async fn complete(&self, messages: &[ChatMessage], stop: &[String]) -> Result<String>;
}

/// Truncate `content` at the earliest occurrence of any stop sequence.
pub fn apply_stop_words(content: &str, stop: &[String]) -> String {
    let earliest = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| content.find(s.as_str()))
        .min();
    match earliest {
        Some(pos) => {
            log::debug!("Applied stop word at position {}", pos);
            content[..pos].trim_end().to_string()
        }
        None => content.to_string(),
    }
}
