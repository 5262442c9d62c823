//! Prompt template for the document question-answering agent.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{RagError, Result};

static VARIABLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_\-]*)\}").unwrap());

/// Answer shown when the retrieved context does not contain the answer.
pub const NOT_FOUND_ANSWER: &str = "I couldn't find relevant information in the document.";

/// Placeholder for `{context}` before anything has been retrieved.
pub const EMPTY_CONTEXT: &str = "(nothing retrieved yet)";

/// Default template. Placeholders: `{tools}`, `{tool_names}`,
/// `{chat_history}`, `{input}`, `{context}`, `{agent_scratchpad}`.
pub const DOCUMENT_QA_TEMPLATE: &str = r#"You are an AI assistant that answers user questions based on retrieved documents (PDF).
Use the provided document context to generate accurate answers.

TOOLS:
------

You have access to the following tools:

{tools}

To use a tool, please use the following format:

```
Thought: Do I need to use a tool? Yes
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
```

When you have a response to say to the User, or if you do not need to use a tool, you MUST use the format:

```
Thought: Do I need to use a tool? No
AI: [your response here]
```

**Instructions:**
- Answer using only the given context.
- If the answer is **not found**, say: *"I couldn't find relevant information in the document."*
- Format responses clearly, using bullet points if necessary.

Begin!

Previous conversation history:
{chat_history}

---
**User Question:** {input}

**Relevant Document Excerpt:**
{context}

---
{agent_scratchpad}"#;

/// A template with `{name}` placeholders.
#[derive(Debug, Clone)]
pub struct AgentPrompt {
    template: String,
}

impl Default for AgentPrompt {
    fn default() -> Self {
        Self::new(DOCUMENT_QA_TEMPLATE)
    }
}

impl AgentPrompt {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Names of the placeholders in the template, in order of appearance.
    pub fn variables(&self) -> Vec<String> {
        VARIABLE_PATTERN
            .captures_iter(&self.template)
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Substitute every placeholder in one pass.
    ///
    /// Substituted values are not rescanned, so braces inside user input or
    /// retrieved text are left alone.
    pub fn render(&self, inputs: &HashMap<&str, String>) -> Result<String> {
        if let Some(missing) = self
            .variables()
            .into_iter()
            .find(|v| !inputs.contains_key(v.as_str()))
        {
            return Err(RagError::Agent {
                message: format!("prompt variable '{}' has no value", missing),
            });
        }

        Ok(VARIABLE_PATTERN
            .replace_all(&self.template, |caps: &Captures| {
                inputs
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned())
    }
}
