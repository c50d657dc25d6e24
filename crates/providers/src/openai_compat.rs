//! OpenAI-compatible chat-completion provider.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions` with function calling. Requests go through the same
//! [`HttpClientCore`] as every other outbound call, so the model endpoint
//! gets rate limiting, retries and error classification for free.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use freshmate_config::ModelConfig;
use freshmate_core::message::Message;
use freshmate_core::provider::{ModelProvider, ModelRequest, ModelResponse, ToolDefinition};
use freshmate_core::{ApiError, AuthContext, Error, ToolCallRequest};
use freshmate_http::{ApiRequest, HttpClientCore};

pub struct OpenAiCompatProvider {
    name: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    credential: AuthContext,
    http: HttpClientCore,
}

impl OpenAiCompatProvider {
    /// Build from the `[model]` config section. An API key is required.
    pub fn new(config: &ModelConfig) -> Result<Self, Error> {
        let key = config.api_key.as_deref().ok_or_else(|| {
            Error::config("model.api_key is not set (or FRESHMATE_MODEL_API_KEY)")
        })?;
        let credential = AuthContext::explicit(key).map_err(|e| Error::config(e.to_string()))?;
        let http = HttpClientCore::new("model", &config.base_url, &config.client)?;

        Ok(Self {
            name: "openai".into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            credential,
            http,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Convert our history into OpenAI chat messages, system prompt first.
    fn to_api_messages(system_prompt: &str, messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            out.push(ApiMessage::text("system", system_prompt));
        }

        for message in messages {
            let api = match message {
                Message::User { content, .. } => ApiMessage::text("user", content),
                Message::Assistant {
                    content, tool_calls, ..
                } => ApiMessage {
                    role: "assistant".into(),
                    content: (!content.is_empty() || tool_calls.is_empty()).then(|| content.clone()),
                    tool_calls: (!tool_calls.is_empty()).then(|| {
                        tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: Value::Object(tc.arguments.clone()).to_string(),
                                },
                            })
                            .collect()
                    }),
                    tool_call_id: None,
                },
                Message::ToolObservation {
                    call_id, content, ..
                } => ApiMessage {
                    role: "tool".into(),
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: Some(call_id.clone()),
                },
            };
            out.push(api);
        }
        out
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Parse the model's argument string. Garbage becomes an empty object so
    /// schema validation reports it back to the model.
    fn parse_arguments(call_id: &str, raw: &str) -> Map<String, Value> {
        if raw.trim().is_empty() {
            return Map::new();
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(call_id, got = %other, "Tool arguments were not a JSON object");
                Map::new()
            }
            Err(e) => {
                warn!(call_id, error = %e, "Tool arguments were not valid JSON");
                Map::new()
            }
        }
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.system_prompt, &request.messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(Self::to_api_tools(&request.tools));
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ApiError> {
        debug!(
            provider = %self.name,
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let api_request = ApiRequest::post("/chat/completions").json(self.request_body(&request));
        let response: ApiResponse = self.http.execute(&api_request, &self.credential).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::unexpected("no choices in completion response"))?;

        let tool_calls: Vec<ToolCallRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                arguments: Self::parse_arguments(&tc.id, &tc.function.arguments),
                id: tc.id,
                name: tc.function.name,
            })
            .collect();

        debug!(
            provider = %self.name,
            tool_calls = tool_calls.len(),
            "Completion received"
        );

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }
}

// --- OpenAI wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    /// Some compatible backends omit or null this; the state machine fills
    /// in an id before dispatch.
    #[serde(default, deserialize_with = "null_as_empty")]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
