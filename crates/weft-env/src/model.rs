//! Model provider port
//!
//! The core consumes this contract only; concrete clients live beside it
//! and are swapped freely in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use weft_core::Result;

/// Requested reply shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A single generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub response_format: ResponseFormat,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            response_format: ResponseFormat::Text,
            temperature: 0.1,
            max_tokens: None,
        }
    }

    pub fn json(mut self) -> Self {
        self.response_format = ResponseFormat::Json;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Full reply including metadata
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

/// Narrow model capability consumed by the core
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate_with_meta(&self, request: &GenerateRequest) -> Result<ModelReply>;

    /// Text-only convenience over [`ModelProvider::generate_with_meta`]
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        Ok(self.generate_with_meta(request).await?.content)
    }
}
