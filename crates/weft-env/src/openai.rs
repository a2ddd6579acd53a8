//! OpenAI-compatible chat client
//!
//! Stateless per request: no conversation history is kept between calls.
//! Rate limits (429) honor `retry-after` and fall back to exponential
//! backoff; 5xx responses retry on the same schedule. Other non-2xx
//! responses surface as [`WeftError::ModelApi`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::{GenerateRequest, ModelProvider, ModelReply, ResponseFormat, ToolCall, Usage};
use weft_core::{Result, WeftError};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Environment variables checked for an API key, in order
pub const API_KEY_VARS: [&str; 2] = ["OPENAI_API_KEY", "OPENCLAW_KEY"];

/// Read the API key from the environment
pub fn api_key_from_env() -> Result<String> {
    for var in API_KEY_VARS {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return Ok(value);
            }
        }
    }
    Err(WeftError::Config(format!(
        "No API key found; set one of: {}",
        API_KEY_VARS.join(", ")
    )))
}

/// OpenAI-compatible model client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            api_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Build a client keyed from the environment
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        Ok(Self::new(api_key_from_env()?, model))
    }

    /// Point at a compatible endpoint (proxies, local servers)
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelProvider for OpenAiClient {
    async fn generate_with_meta(&self, request: &GenerateRequest) -> Result<ModelReply> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: match request.response_format {
                ResponseFormat::Json => Some(FormatSpec {
                    kind: "json_object".to_string(),
                }),
                ResponseFormat::Text => None,
            },
        };

        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!(
                "Sending request to model {} (attempt {})",
                self.model,
                retries + 1
            );

            let response = self
                .client
                .post(&self.api_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| WeftError::ModelApi(format!("Failed to send request: {}", e)))?;

            let status = response.status();

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RETRIES {
                    let detail = response.text().await.unwrap_or_else(|_| "Unknown".to_string());
                    return Err(WeftError::ModelApi(format!(
                        "Rate limit exceeded after {} retries: {}",
                        MAX_RETRIES, detail
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited (429). Waiting {}s before retry {}/{}",
                    wait_secs,
                    retries,
                    MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let detail = response.text().await.unwrap_or_else(|_| "Unknown".to_string());

                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        "Server error ({}). Waiting {}s before retry {}/{}",
                        status,
                        backoff_secs,
                        retries,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                return Err(WeftError::ModelApi(format!(
                    "Model API error {}: {}",
                    status, detail
                )));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| WeftError::ModelApi(format!("Failed to parse response: {}", e)))?;

            let choice = parsed
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| WeftError::ModelApi("No choices in response".to_string()))?;

            let tool_calls = choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|tc| ToolCall {
                    name: tc.function.name,
                    arguments: serde_json::from_str(&tc.function.arguments)
                        .unwrap_or(serde_json::Value::Null),
                })
                .collect();

            return Ok(ModelReply {
                content: choice.message.content.unwrap_or_default(),
                tool_calls,
                usage: parsed.usage.map(|u| Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                }),
            });
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<FormatSpec>,
}

#[derive(Debug, Serialize)]
struct FormatSpec {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    function: ChatFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ChatFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = OpenAiClient::new("key", "gpt-4o-mini")
            .with_api_url("http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model(), "gpt-4o-mini");
        assert_eq!(client.api_url, "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "choices": [{"message": {"content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices.len(), 1);
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(parsed.usage.as_ref().unwrap().prompt_tokens, 10);
    }

    #[test]
    fn test_json_format_serialization() {
        let body = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: 0.1,
            max_tokens: None,
            response_format: Some(FormatSpec {
                kind: "json_object".to_string(),
            }),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"type\":\"json_object\""));
        assert!(!json.contains("max_tokens"));
    }
}
