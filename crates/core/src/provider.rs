//! Model provider trait: the abstraction over chat-completion backends.
//!
//! The conversation state machine only ever talks to a [`ModelProvider`];
//! it does not know whether the other end is an OpenAI-compatible endpoint
//! or a scripted test double.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::message::Message;
use crate::tool::ToolCallRequest;

/// One request to the model: the whole (sanitized) history plus the tools
/// it may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System instructions prepended to the history.
    pub system_prompt: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The model's reply: either a final answer (no tool calls) or a batch of
/// tool calls to dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelResponse {
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// The core ModelProvider trait.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_answer_has_no_calls() {
        assert!(ModelResponse::answer("done").is_final());
        let resp = ModelResponse::calls(vec![ToolCallRequest::new(
            "c1",
            "list_products",
            serde_json::json!({}),
        )]);
        assert!(!resp.is_final());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "expiring_products".into(),
            description: "Products expiring soon".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "days": { "type": "integer", "description": "Look-ahead window" }
                }
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("expiring_products"));
        assert!(json.contains("days"));
    }
}
