//! Output parsing for ReAct-style conversational agent responses.
//!
//! Converts raw LLM text into an [`AgentAction`] (call a tool) or an
//! [`AgentFinish`] (reply to the user).

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static FINISH_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:AI|Final Answer)\s*:").unwrap());
static ACTION_WITH_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:\s*(.+?)\s*(?:\n|\r\n?)\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)")
        .unwrap()
});
static ACTION_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"Action\s*\d*\s*:").unwrap());
static ACTION_INPUT_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Action\s*\d*\s*Input\s*\d*\s*:").unwrap());

const MISSING_ACTION_AFTER_THOUGHT_ERROR_MESSAGE: &str =
    "Invalid Format: Missing 'Action:' after 'Thought:'";

const MISSING_ACTION_INPUT_AFTER_ACTION_ERROR_MESSAGE: &str =
    "Invalid Format: Missing 'Action Input:' after 'Action:'";

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub thought: String,
    pub tool: String,
    pub tool_input: String,
    /// The raw model output this action was parsed from.
    pub text: String,
    /// Observation returned by the tool, once it has run.
    pub result: Option<String>,
}

/// The model's reply to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFinish {
    pub thought: String,
    pub output: String,
    pub text: String,
}

/// Outcome of parsing one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Action(AgentAction),
    Finish(AgentFinish),
}

/// Raised when the response follows neither format.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParserError {
    pub error: String,
}

impl OutputParserError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl fmt::Display for OutputParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for OutputParserError {}

/// Parse a model response.
///
/// **Final answer** (results in [`AgentFinish`]):
/// ```text
/// Thought: Do I need to use a tool? No
/// AI: The encoder has six layers.
/// ```
///
/// **Action** (results in [`AgentAction`]):
/// ```text
/// Thought: Do I need to use a tool? Yes
/// Action: Document Retriever
/// Action Input: number of encoder layers
/// ```
///
/// The marker may appear mid-line but must start a word. A final-answer
/// marker wins over an action when both are present.
pub fn parse_output(text: &str) -> Result<AgentStep, OutputParserError> {
    let thought = extract_thought(text);

    if let Some(marker) = FINISH_MARKER.find_iter(text).last() {
        let answer = clean_trailing_backticks(text[marker.end()..].trim());
        return Ok(AgentStep::Finish(AgentFinish {
            thought,
            output: answer,
            text: text.to_string(),
        }));
    }

    if let Some(caps) = ACTION_WITH_INPUT.captures(text) {
        let tool = clean_action(caps.get(1).map_or("", |m| m.as_str()));
        let raw_input = caps.get(2).map_or("", |m| m.as_str());
        // The model sometimes hallucinates its own observation.
        let raw_input = raw_input
            .split("\nObservation")
            .next()
            .unwrap_or(raw_input);
        let tool_input = raw_input.trim().trim_matches('"').trim().to_string();

        return Ok(AgentStep::Action(AgentAction {
            thought,
            tool,
            tool_input,
            text: text.to_string(),
            result: None,
        }));
    }

    if !ACTION_ONLY.is_match(text) {
        return Err(OutputParserError::new(format!(
            "{}\nYou MUST use the following format:\n\
             Thought: Do I need to use a tool? No\n\
             AI: [your response here]",
            MISSING_ACTION_AFTER_THOUGHT_ERROR_MESSAGE
        )));
    }

    if !ACTION_INPUT_ONLY.is_match(text) {
        return Err(OutputParserError::new(
            MISSING_ACTION_INPUT_AFTER_ACTION_ERROR_MESSAGE,
        ));
    }

    Err(OutputParserError::new(
        "Could not parse the output. Please use the correct format.",
    ))
}

/// Text before the first action or answer line, without the `Thought:` label.
fn extract_thought(text: &str) -> String {
    let end = [
        text.find("\nAction"),
        FINISH_MARKER.find(text).map(|m| m.start()),
    ]
    .into_iter()
    .flatten()
    .min()
    .unwrap_or(0);

    let thought = text[..end].replace("```", "");
    let thought = thought.trim();
    thought
        .strip_prefix("Thought:")
        .unwrap_or(thought)
        .trim()
        .to_string()
}

fn clean_action(text: &str) -> String {
    text.trim().trim_matches('*').trim().to_string()
}

/// Drop an unmatched trailing code fence.
fn clean_trailing_backticks(text: &str) -> String {
    if text.ends_with("```") && text.matches("```").count() % 2 != 0 {
        text[..text.len() - 3].trim_end().to_string()
    } else {
        text.to_string()
    }
}
