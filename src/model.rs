//! Collaborator interfaces for the model provider call
//!
//! The scheduler treats the provider as a black box: an injected
//! [`ModelClient`] that turns an [`AiRequest`] into text or an error. The
//! error taxonomy distinguishes transient failures (retried with backoff)
//! from terminal ones (propagated immediately).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single role-tagged message in a request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// A request to the model provider.
///
/// Immutable once constructed; consumed by the injected [`ModelClient`].
/// Tool specifications are carried as opaque JSON so the core stays
/// independent of the provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRequest {
    /// Ordered role-tagged messages
    pub messages: Vec<Message>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Optional tool/function specification (opaque to the scheduler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
    /// Optional tool choice directive (opaque to the scheduler)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    /// Expected response size, added on top of the prompt cost when
    /// reserving tokens
    pub estimated_response_tokens: u32,
}

impl AiRequest {
    pub fn new(messages: Vec<Message>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            temperature: 0.5,
            tools: None,
            tool_choice: None,
            estimated_response_tokens: 500,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: serde_json::Value) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: serde_json::Value) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_estimated_response_tokens(mut self, tokens: u32) -> Self {
        self.estimated_response_tokens = tokens;
        self
    }

    /// Concatenated prompt text, used for token cost estimation
    pub fn prompt_text(&self) -> String {
        let mut text = String::new();
        for message in &self.messages {
            text.push_str(&message.role);
            text.push('\n');
            text.push_str(&message.content);
            text.push('\n');
        }
        text
    }
}

/// Errors from the model provider call
#[derive(Debug, Error)]
pub enum ModelError {
    /// Provider-side rate limiting (429 and friends)
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    /// Network-level timeout
    #[error("Provider call timed out: {0}")]
    Timeout(String),

    /// Transient transport failure (connection reset, DNS, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request rejected by the provider; retrying cannot help
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other terminal provider failure
    #[error("Provider error: {0}")]
    Provider(String),
}

impl ModelError {
    /// Whether a retry with backoff can plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::RateLimited(_) | ModelError::Timeout(_) | ModelError::Transport(_)
        )
    }
}

/// The injected network call into the model provider.
///
/// Implementations own the transport and the wire format; the scheduler
/// wraps every call with the response cache and the retry policy.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &AiRequest) -> Result<String, ModelError>;
}
