//! Google Gemini chat model over the Generative Language REST API.
//!
//! # Authentication
//!
//! Uses `GOOGLE_API_KEY` (or `GEMINI_API_KEY`), passed as the `key` query
//! parameter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{apply_stop_words, ChatMessage, ChatModel, Role};
use crate::error::{RagError, Result};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const MAX_RETRIES: u32 = 2;

/// Gemini allows at most this many stop sequences per request.
const MAX_STOP_SEQUENCES: usize = 5;

/// Settings for [`GeminiChat`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_base() -> String {
    API_BASE.to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            temperature: None,
            max_output_tokens: None,
            api_base: default_api_base(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiChat {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiChat {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Build the `generationConfig` object.
    pub fn generation_config(&self, stop: &[String]) -> Value {
        let mut config = serde_json::Map::new();
        if let Some(temp) = self.config.temperature {
            config.insert("temperature".to_string(), serde_json::json!(temp));
        }
        if let Some(max_tokens) = self.config.max_output_tokens {
            config.insert("maxOutputTokens".to_string(), serde_json::json!(max_tokens));
        }
        if !stop.is_empty() {
            let stops: Vec<&String> = stop.iter().take(MAX_STOP_SEQUENCES).collect();
            config.insert("stopSequences".to_string(), serde_json::json!(stops));
        }
        Value::Object(config)
    }

    /// Build the complete request body.
    ///
    /// System messages are lifted into `systemInstruction`; assistant turns
    /// use Gemini's `model` role.
    fn build_request_body(&self, messages: &[ChatMessage], stop: &[String]) -> Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::System => {
                    system_parts.push(&msg.content);
                    continue;
                }
                Role::User => "user",
                Role::Assistant => "model",
            };
            contents.push(serde_json::json!({
                "role": role,
                "parts": [{ "text": msg.content }],
            }));
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": self.generation_config(stop),
        });

        if !system_parts.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system_parts.join("\n\n") }]
            });
        }

        body
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_response(response: &Value) -> Result<String> {
    if let Some(error) = response.get("error") {
        let msg = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown Gemini API error");
        return Err(RagError::llm(format!("Gemini API error: {}", msg)));
    }

    let candidate = response
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = response
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            RagError::llm(format!("Gemini returned no answer: {}", reason))
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing content");
            RagError::llm(format!("Gemini candidate has no content: {}", reason))
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

fn log_token_usage(response: &Value) {
    if let Some(usage) = response.get("usageMetadata") {
        let prompt = usage
            .get("promptTokenCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let completion = usage
            .get("candidatesTokenCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        log::debug!(
            "Gemini usage: prompt_tokens={}, completion_tokens={}, total_tokens={}",
            prompt,
            completion,
            prompt + completion
        );
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[ChatMessage], stop: &[String]) -> Result<String> {
        log::debug!(
            "GeminiChat.complete: model={}, messages={}",
            self.config.model,
            messages.len(),
        );

        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            RagError::config(
                "GOOGLE_API_KEY",
                "Gemini API key not set. Set GOOGLE_API_KEY or GEMINI_API_KEY.",
            )
        })?;

        let body = self.build_request_body(messages, stop);
        let endpoint = self.endpoint();

        // Retry loop with exponential backoff
        let mut last_error: Option<RagError> = None;
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                log::warn!("Gemini API retry attempt {} after {:?}", attempt, retry_delay);
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let response = match self
                .client
                .post(&endpoint)
                .query(&[("key", api_key)])
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(e.into());
                    continue;
                }
            };

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                last_error = Some(RagError::llm("Rate limited by Gemini API (429)"));
                continue;
            }

            if status.is_server_error() {
                last_error = Some(RagError::llm(format!("Gemini API server error: {}", status)));
                continue;
            }

            let response_text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_error = Some(e.into());
                    continue;
                }
            };

            if status.is_client_error() {
                return Err(RagError::llm(format!(
                    "Gemini API error ({}): {}",
                    status, response_text
                )));
            }

            let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
                RagError::llm(format!(
                    "Failed to parse Gemini response: {} - Body: {}",
                    e,
                    response_text.chars().take(500).collect::<String>()
                ))
            })?;

            log_token_usage(&response_json);
            let text = parse_response(&response_json)?;
            return Ok(apply_stop_words(&text, stop));
        }

        Err(last_error.unwrap_or_else(|| RagError::llm("Gemini API call failed after all retries")))
    }
}
