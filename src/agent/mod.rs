//! Conversational ReAct agent.
//!
//! Each iteration renders the prompt (instructions, tool list, chat
//! history, question, retrieved context and the scratchpad of earlier
//! steps), asks the model for the next step, and either runs the requested
//! tool or returns the model's answer.

pub mod parser;
pub mod prompt;
pub mod tools;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::ChatHistory;
use crate::llm::{ChatMessage, ChatModel};

pub use parser::{parse_output, AgentAction, AgentFinish, AgentStep, OutputParserError};
pub use prompt::{AgentPrompt, DOCUMENT_QA_TEMPLATE, EMPTY_CONTEXT, NOT_FOUND_ANSWER};
pub use tools::{DocumentRetrieverTool, Tool};

/// Answer returned when the iteration budget runs out.
pub const ITERATION_LIMIT_ANSWER: &str = "Agent stopped due to iteration limit or time limit.";

/// Tool name recorded for steps whose output could not be parsed.
pub const PARSE_ERROR_TOOL: &str = "_Exception";

const OBSERVATION_STOP: &str = "\nObservation:";

fn default_max_iterations() -> usize {
    15
}

/// Result of one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub answer: String,
    /// Intermediate steps with their observations, in order.
    pub steps: Vec<AgentAction>,
}

/// Agent tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Log every thought, action and observation at info level.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            verbose: false,
        }
    }
}

/// An LLM-driven agent with a fixed tool set.
#[derive(Debug, Clone)]
pub struct ConversationalAgent {
    llm: Arc<dyn ChatModel>,
    tools: Vec<Arc<dyn Tool>>,
    prompt: AgentPrompt,
    settings: AgentSettings,
}

impl ConversationalAgent {
    pub fn new(llm: Arc<dyn ChatModel>, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            llm,
            tools,
            prompt: AgentPrompt::default(),
            settings: AgentSettings::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: AgentPrompt) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tool_names(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn tool_descriptions(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("> {}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Answer `input` given the conversation so far.
    pub async fn run(&self, input: &str, history: &ChatHistory) -> Result<AgentOutcome> {
        let stop = vec![OBSERVATION_STOP.to_string()];
        let chat_history = history.transcript();
        let mut steps: Vec<AgentAction> = Vec::new();
        let mut context: Vec<String> = Vec::new();

        for iteration in 0..self.settings.max_iterations {
            let rendered = self.render_prompt(input, &chat_history, &context, &steps)?;
            let output = self
                .llm
                .complete(&[ChatMessage::user(rendered)], &stop)
                .await?;
            log::debug!("Agent iteration {} output: {}", iteration + 1, output);

            match parse_output(&output) {
                Ok(AgentStep::Finish(finish)) => {
                    if self.settings.verbose {
                        log::info!("Thought: {}", finish.thought);
                        log::info!("Final answer: {}", finish.output);
                    }
                    return Ok(AgentOutcome {
                        answer: finish.output,
                        steps,
                    });
                }
                Ok(AgentStep::Action(mut action)) => {
                    if self.settings.verbose {
                        log::info!("Thought: {}", action.thought);
                        log::info!("Action: {} [{}]", action.tool, action.tool_input);
                    }
                    let observation = match self.find_tool(&action.tool) {
                        Some(tool) => {
                            let observation = tool.run(&action.tool_input).await?;
                            context.push(observation.clone());
                            observation
                        }
                        None => format!(
                            "{} is not a valid tool, try one of [{}].",
                            action.tool,
                            self.tool_names()
                        ),
                    };
                    if self.settings.verbose {
                        log::info!("Observation: {}", observation);
                    }
                    action.result = Some(observation);
                    steps.push(action);
                }
                Err(parse_error) => {
                    log::warn!("Could not parse agent output: {}", parse_error);
                    steps.push(AgentAction {
                        thought: String::new(),
                        tool: PARSE_ERROR_TOOL.to_string(),
                        tool_input: String::new(),
                        text: output,
                        result: Some(parse_error.to_string()),
                    });
                }
            }
        }

        log::warn!(
            "Agent hit the iteration limit ({}) for '{}'",
            self.settings.max_iterations,
            input
        );
        Ok(AgentOutcome {
            answer: ITERATION_LIMIT_ANSWER.to_string(),
            steps,
        })
    }

    fn render_prompt(
        &self,
        input: &str,
        chat_history: &str,
        context: &[String],
        steps: &[AgentAction],
    ) -> Result<String> {
        let context = if context.is_empty() {
            EMPTY_CONTEXT.to_string()
        } else {
            context.join("\n\n")
        };

        let inputs = HashMap::from([
            ("tools", self.tool_descriptions()),
            ("tool_names", self.tool_names()),
            ("chat_history", chat_history.to_string()),
            ("input", input.to_string()),
            ("context", context),
            ("agent_scratchpad", scratchpad(steps)),
        ]);
        self.prompt.render(&inputs)
    }
}

/// Replay earlier steps so the model continues where it left off.
fn scratchpad(steps: &[AgentAction]) -> String {
    let mut pad = String::new();
    for step in steps {
        pad.push_str(&step.text);
        pad.push_str("\nObservation: ");
        pad.push_str(step.result.as_deref().unwrap_or(""));
        pad.push_str("\nThought: ");
    }
    pad
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::{RagError, Result};
    use crate::llm::{ChatMessage, ChatModel};

    /// Replays canned responses and records every prompt it receives.
    #[derive(Debug, Default)]
    pub struct ScriptedModel {
        responses: Mutex<VecDeque<String>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, messages: &[ChatMessage], _stop: &[String]) -> Result<String> {
            self.prompts.lock().push(
                messages
                    .iter()
                    .map(|m| m.content.clone())
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
            self.responses
                .lock()
                .pop_front()
                .ok_or_else(|| RagError::llm("script exhausted"))
        }
    }
}
