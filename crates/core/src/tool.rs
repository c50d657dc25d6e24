//! Tool trait: the abstraction over assistant capabilities.
//!
//! Tools are how the model reaches the outside world: list pantry items,
//! look up barcodes, search recipes. Each tool declares a JSON Schema for its
//! arguments; the [`ToolRegistry`] compiles it once at registration and checks
//! every call against it before the tool ever runs.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::AuthContext;
use crate::error::{ApiError, ToolError};
use crate::message::Message;
use crate::provider::ToolDefinition;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of one tool call. Failures are data, not control flow: the
/// model sees them as observations and decides what to do next.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: std::result::Result<Value, ApiError>,
}

impl ToolCallResult {
    pub fn success(call: &ToolCallRequest, data: Value) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: Ok(data),
        }
    }

    pub fn failure(call: &ToolCallRequest, error: ApiError) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Render the envelope handed back to the model.
    ///
    /// `{"success":true,"data":...}` or
    /// `{"success":false,"error":"...","error_type":"..."}`.
    pub fn to_observation(&self) -> String {
        let envelope = match &self.outcome {
            Ok(data) => json!({ "success": true, "data": data }),
            Err(err) => json!({
                "success": false,
                "error": err.message(),
                "error_type": err.kind().as_str(),
            }),
        };
        envelope.to_string()
    }

    pub fn into_message(self) -> Message {
        let content = self.to_observation();
        Message::observation(self.call_id, self.tool_name, content)
    }
}

/// The core Tool trait.
///
/// Each capability (list_products, search_recipes, ...) implements this
/// trait and is registered in a [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "list_products").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Whether calls to this tool must never overlap. Mutating tools
    /// return `true`.
    fn exclusive(&self) -> bool {
        false
    }

    /// Run the tool. Arguments have already been validated against
    /// [`Tool::parameters_schema`].
    async fn invoke(
        &self,
        arguments: &Map<String, Value>,
        auth: &AuthContext,
    ) -> std::result::Result<Value, ApiError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    schema: JSONSchema,
    guard: Option<Mutex<()>>,
}

/// A registry of available tools.
///
/// Registration is done up front; afterwards the registry is read-only and
/// is shared behind an `Arc` by every concurrent call.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, compiling its schema. Replaces any existing tool
    /// with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        let raw_schema = tool.parameters_schema();
        let schema = JSONSchema::compile(&raw_schema).map_err(|e| ToolError::InvalidSchema {
            tool_name: name.clone(),
            reason: e.to_string(),
        })?;
        let guard = tool.exclusive().then(|| Mutex::new(()));

        debug!(tool = %name, exclusive = guard.is_some(), "Registered tool");
        self.tools.insert(
            name,
            RegisteredTool {
                tool,
                schema,
                guard,
            },
        );
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| Arc::clone(&t.tool))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions (for sending to the model), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.tool.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check a call against the registry without running it.
    pub fn validate(&self, call: &ToolCallRequest) -> std::result::Result<(), ApiError> {
        let entry = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ApiError::validation(format!("unknown tool: {}", call.name)))?;
        Self::check_arguments(entry, call)
    }

    fn check_arguments(
        entry: &RegisteredTool,
        call: &ToolCallRequest,
    ) -> std::result::Result<(), ApiError> {
        let instance = Value::Object(call.arguments.clone());
        if let Err(errors) = entry.schema.validate(&instance) {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(ApiError::validation(format!(
                "invalid arguments for {}: {}",
                call.name,
                messages.join("; ")
            )));
        }
        Ok(())
    }

    /// Validate and run one call. Unknown tools and schema violations come
    /// back as validation failures without touching the network.
    pub async fn invoke(&self, call: &ToolCallRequest, auth: &AuthContext) -> ToolCallResult {
        let Some(entry) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Model requested unknown tool");
            return ToolCallResult::failure(
                call,
                ApiError::validation(format!("unknown tool: {}", call.name)),
            );
        };

        if let Err(err) = Self::check_arguments(entry, call) {
            warn!(tool = %call.name, call_id = %call.id, error = %err, "Rejected tool arguments");
            return ToolCallResult::failure(call, err);
        }

        let _permit = match &entry.guard {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        debug!(tool = %call.name, call_id = %call.id, "Invoking tool");
        match entry.tool.invoke(&call.arguments, auth).await {
            Ok(data) => ToolCallResult::success(call, data),
            Err(err) => {
                debug!(tool = %call.name, call_id = %call.id, kind = %err.kind(), "Tool failed");
                ToolCallResult::failure(call, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn invoke(
            &self,
            arguments: &Map<String, Value>,
            _auth: &AuthContext,
        ) -> std::result::Result<Value, ApiError> {
            Ok(arguments["text"].clone())
        }
    }

    /// Counts how many invocations overlap.
    struct SlowWriter {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Tool for SlowWriter {
        fn name(&self) -> &str {
            "slow_writer"
        }
        fn description(&self) -> &str {
            "Mutates something slowly"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn exclusive(&self) -> bool {
            true
        }
        async fn invoke(
            &self,
            _arguments: &Map<String, Value>,
            _auth: &AuthContext,
        ) -> std::result::Result<Value, ApiError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    fn auth() -> AuthContext {
        AuthContext::explicit("test-token").unwrap()
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn registry_definitions() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["required"][0], "text");
    }

    #[tokio::test]
    async fn registry_invokes_tool() {
        let call = ToolCallRequest::new("call_1", "echo", json!({"text": "hello world"}));
        let result = registry().invoke(&call, &auth()).await;
        assert_eq!(result.outcome, Ok(json!("hello world")));
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn unknown_tool_is_validation_failure() {
        let call = ToolCallRequest::new("call_1", "nonexistent", json!({}));
        let result = registry().invoke(&call, &auth()).await;
        let err = result.outcome.unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        assert!(err.message().contains("nonexistent"));
    }

    #[tokio::test]
    async fn schema_violation_is_validation_failure() {
        let call = ToolCallRequest::new("call_1", "echo", json!({"text": 42}));
        let result = registry().invoke(&call, &auth()).await;
        assert!(matches!(result.outcome, Err(ApiError::Validation { .. })));

        let missing = ToolCallRequest::new("call_2", "echo", json!({}));
        assert!(registry().validate(&missing).is_err());
    }

    #[test]
    fn invalid_schema_rejected_at_registration() {
        struct BadSchema;

        #[async_trait]
        impl Tool for BadSchema {
            fn name(&self) -> &str {
                "bad"
            }
            fn description(&self) -> &str {
                "Broken schema"
            }
            fn parameters_schema(&self) -> Value {
                json!({ "type": "not-a-type" })
            }
            async fn invoke(
                &self,
                _arguments: &Map<String, Value>,
                _auth: &AuthContext,
            ) -> std::result::Result<Value, ApiError> {
                Ok(Value::Null)
            }
        }

        let mut registry = ToolRegistry::new();
        let err = registry.register(Arc::new(BadSchema)).unwrap_err();
        assert!(matches!(err, ToolError::InvalidSchema { .. }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn exclusive_tool_never_overlaps() {
        let writer = Arc::new(SlowWriter {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut registry = ToolRegistry::new();
        registry.register(writer.clone()).unwrap();
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for i in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let call = ToolCallRequest::new(format!("c{i}"), "slow_writer", json!({}));
                registry.invoke(&call, &auth()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }
        assert_eq!(writer.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observation_envelopes() {
        let call = ToolCallRequest::new("c1", "echo", json!({}));
        let ok = ToolCallResult::success(&call, json!([1, 2]));
        let parsed: Value = serde_json::from_str(&ok.to_observation()).unwrap();
        assert_eq!(parsed, json!({"success": true, "data": [1, 2]}));

        let failed = ToolCallResult::failure(&call, ApiError::not_found("no such product"));
        let parsed: Value = serde_json::from_str(&failed.to_observation()).unwrap();
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "no such product");
        assert_eq!(parsed["error_type"], "not_found_error");

        match failed.into_message() {
            Message::ToolObservation { call_id, .. } => assert_eq!(call_id, "c1"),
            other => panic!("unexpected message {other:?}"),
        }
    }
}
