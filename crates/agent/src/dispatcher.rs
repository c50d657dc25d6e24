//! Concurrent, order-preserving execution of one batch of tool calls.
//!
//! Every call runs as its own task. The number of calls in flight is capped
//! at the number of distinct tool names in the batch, and results come back
//! in request order no matter which finishes first. Tool failures are data inside
//! [`ToolCallResult`]; the only error this module returns is a task that
//! panicked or was cancelled.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error};

use freshmate_core::{AuthContext, ToolCallRequest, ToolCallResult, ToolRegistry};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("tool '{tool_name}' (call {call_id}) crashed: {reason}")]
    TaskFailed {
        tool_name: String,
        call_id: String,
        reason: String,
    },
}

pub struct ToolInvocationDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolInvocationDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Concurrency limit for a batch: the number of distinct tool names.
    pub fn concurrency_for(calls: &[ToolCallRequest]) -> usize {
        calls
            .iter()
            .map(|c| c.name.as_str())
            .collect::<HashSet<_>>()
            .len()
            .max(1)
    }

    /// Run every call and return exactly one result per call, in order.
    pub async fn dispatch(
        &self,
        calls: &[ToolCallRequest],
        auth: &AuthContext,
    ) -> Result<Vec<ToolCallResult>, DispatchError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let limit = Self::concurrency_for(calls);
        debug!(calls = calls.len(), concurrency = limit, token = %auth.fingerprint(), "Dispatching tool batch");

        let outcomes: Vec<Result<ToolCallResult, JoinError>> = stream::iter(calls.iter().cloned())
            .map(|call| {
                let registry = Arc::clone(&self.registry);
                let auth = auth.clone();
                AbortOnDrop(tokio::spawn(async move { registry.invoke(&call, &auth).await }))
            })
            .buffered(limit)
            .collect()
            .await;

        calls
            .iter()
            .zip(outcomes)
            .map(|(call, outcome)| {
                outcome.map_err(|join_error| {
                    let reason = panic_reason(join_error);
                    error!(tool = %call.name, call_id = %call.id, %reason, "Tool task failed");
                    DispatchError::TaskFailed {
                        tool_name: call.name.clone(),
                        call_id: call.id.clone(),
                        reason,
                    }
                })
            })
            .collect()
    }
}

fn panic_reason(join_error: JoinError) -> String {
    if join_error.is_cancelled() {
        return "task cancelled".into();
    }
    match join_error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".into()),
        Err(other) => other.to_string(),
    }
}

/// A spawned task that is aborted when its handle is dropped, so a turn
/// that hits its deadline does not leave tool calls running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockTool, auth, call};
    use freshmate_core::ApiError;
    use std::time::Duration;

    fn dispatcher(tools: Vec<MockTool>) -> ToolInvocationDispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(Arc::new(tool)).unwrap();
        }
        ToolInvocationDispatcher::new(Arc::new(registry))
    }

    #[test]
    fn concurrency_counts_distinct_names() {
        let calls = vec![call("a", "x"), call("b", "x"), call("c", "y")];
        assert_eq!(ToolInvocationDispatcher::concurrency_for(&calls), 2);
        assert_eq!(ToolInvocationDispatcher::concurrency_for(&[]), 1);
    }

    #[tokio::test]
    async fn empty_batch_is_empty() {
        let d = dispatcher(vec![]);
        assert!(d.dispatch(&[], &auth()).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn results_keep_request_order() {
        let d = dispatcher(vec![
            MockTool::ok("slow").with_delay(Duration::from_millis(300)),
            MockTool::ok("fast"),
        ]);
        let calls = vec![call("1", "slow"), call("2", "fast")];
        let results = d.dispatch(&calls, &auth()).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert!(results.iter().all(|r| r.is_success()));
    }

    #[tokio::test]
    async fn middle_failure_keeps_order_and_error() {
        let d = dispatcher(vec![
            MockTool::ok("lookup"),
            MockTool::failing("missing", ApiError::not_found("no such product")),
        ]);
        let calls = vec![call("a", "lookup"), call("b", "missing"), call("c", "lookup")];
        let results = d.dispatch(&calls, &auth()).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].call_id, "a");
        assert!(results[0].is_success());
        assert_eq!(results[1].call_id, "b");
        assert!(matches!(results[1].outcome, Err(ApiError::NotFound { .. })));
        assert_eq!(results[2].call_id, "c");
        assert!(results[2].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn batch_runs_as_many_calls_as_distinct_names() {
        let a = MockTool::ok("a").with_delay(Duration::from_millis(100));
        let b = MockTool::ok("b").with_delay(Duration::from_millis(100));
        let peak_a = a.peak();
        let peak_b = b.peak();
        let d = dispatcher(vec![a, b]);

        let calls = vec![call("1", "a"), call("2", "b"), call("3", "a"), call("4", "b")];
        let start = tokio::time::Instant::now();
        let results = d.dispatch(&calls, &auth()).await.unwrap();
        assert_eq!(results.len(), 4);

        // Two at a time, two rounds.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300));
        assert_eq!(peak_a.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(peak_b.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_tool_is_fatal() {
        let d = dispatcher(vec![MockTool::ok("fine"), MockTool::panicking("boom")]);
        let calls = vec![call("1", "fine"), call("2", "boom")];
        let err = d.dispatch(&calls, &auth()).await.unwrap_err();
        let DispatchError::TaskFailed {
            tool_name, reason, ..
        } = err;
        assert_eq!(tool_name, "boom");
        assert!(reason.contains("mock tool panicked"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_result_not_an_error() {
        let d = dispatcher(vec![]);
        let results = d.dispatch(&[call("1", "ghost")], &auth()).await.unwrap();
        assert!(matches!(results[0].outcome, Err(ApiError::Validation { .. })));
    }
}
