//! Shared test doubles for the dispatcher, state machine and service tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use freshmate_core::{
    ApiError, AuthContext, ModelProvider, ModelRequest, ModelResponse, Tool, ToolCallRequest,
};

pub fn auth() -> AuthContext {
    AuthContext::explicit("test-token").unwrap()
}

pub fn call(id: &str, name: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, name, json!({}))
}

pub fn call_with(id: &str, name: &str, args: Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, args)
}

/// A provider that replays scripted responses and records every request.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ModelResponse, ApiError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<ModelResponse, ApiError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn replies(responses: Vec<ModelResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ApiError> {
        let call_number = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no response for call #{call_number}"))
    }
}

enum Behaviour {
    Succeed(Value),
    Fail(ApiError),
    Panic,
}

/// A configurable tool that counts invocations and peak concurrency.
pub struct MockTool {
    name: String,
    behaviour: Behaviour,
    delay: Option<Duration>,
    exclusive: bool,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockTool {
    fn build(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            delay: None,
            exclusive: false,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ok(name: &str) -> Self {
        Self::build(name, Behaviour::Succeed(json!({ "tool": name })))
    }

    pub fn returning(name: &str, data: Value) -> Self {
        Self::build(name, Behaviour::Succeed(data))
    }

    pub fn failing(name: &str, error: ApiError) -> Self {
        Self::build(name, Behaviour::Fail(error))
    }

    pub fn panicking(name: &str) -> Self {
        Self::build(name, Behaviour::Panic)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn peak(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.peak)
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    fn exclusive(&self) -> bool {
        self.exclusive
    }

    async fn invoke(&self, _arguments: &Map<String, Value>, _auth: &AuthContext) -> Result<Value, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &self.behaviour {
            Behaviour::Succeed(data) => Ok(data.clone()),
            Behaviour::Fail(error) => Err(error.clone()),
            Behaviour::Panic => panic!("mock tool panicked: {}", self.name),
        }
    }
}
