//! In-memory chat history shown in the UI and fed back to the agent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who said a line of the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "User"),
            Speaker::Agent => write!(f, "Agent"),
        }
    }
}

/// One line of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Speaker,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Ordered conversation log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Speaker, message: impl Into<String>) {
        self.turns.push(ChatTurn {
            role,
            message: message.into(),
            at: Utc::now(),
        });
    }

    /// Record a completed question/answer exchange.
    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.push(Speaker::User, question);
        self.push(Speaker::Agent, answer);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Plain-text transcript, one `Speaker: message` line per turn.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_exchange_order() {
        let mut history = ChatHistory::new();
        history.record_exchange("What is attention?", "A weighting over tokens.");
        assert_eq!(history.len(), 2);
        assert_eq!(history.turns()[0].role, Speaker::User);
        assert_eq!(history.turns()[1].role, Speaker::Agent);
        assert_eq!(
            history.transcript(),
            "User: What is attention?\nAgent: A weighting over tokens."
        );
    }

    #[test]
    fn test_serializes_as_list() {
        let mut history = ChatHistory::new();
        history.push(Speaker::User, "hi");
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json[0]["role"], "User");
        assert_eq!(json[0]["message"], "hi");
    }
}
