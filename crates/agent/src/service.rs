//! The conversation entry point.
//!
//! Loads a thread's history and summary, runs one turn through the state
//! machine, and appends the turn's messages only if it finished. A finished
//! turn may then fold older messages into the thread's summary. Turns on the
//! same thread run one at a time; different threads run concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use freshmate_config::AgentConfig;
use freshmate_core::{
    ApiError, AuthContext, Error, HistoryError, HistoryStore, Message, ModelProvider, ThreadId,
    ThreadSummary, ToolRegistry,
};

use crate::dispatcher::ToolInvocationDispatcher;
use crate::state_machine::{ConversationState, ConversationStateMachine, TurnOutcome, TurnReport};
use crate::summary::ConversationSummarizer;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Freshmate, a kitchen assistant that helps people use up the food they \
already have. You can read and update the user's pantry (products and their \
expiry dates) and search for recipes.

- Use the tools to look things up; never invent products, dates or recipes.
- When asked what is expiring, call expiring_products with an appropriate window.
- Prefer recipes that use ingredients close to expiry.
- Only add, update or remove pantry entries when the user asks you to.
- If a tool reports an error, explain it briefly and suggest what to do next.
- Dates are YYYY-MM-DD.";

/// One user message to process.
#[derive(Clone)]
pub struct TurnRequest {
    pub message: String,
    pub auth: AuthContext,
    pub thread_id: ThreadId,
    /// Overrides the configured per-turn budget.
    pub tool_call_budget: Option<u32>,
}

impl TurnRequest {
    pub fn new(thread_id: ThreadId, message: impl Into<String>, auth: AuthContext) -> Self {
        Self {
            message: message.into(),
            auth,
            thread_id,
            tool_call_budget: None,
        }
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.tool_call_budget = Some(budget);
        self
    }
}

pub struct ConversationService {
    machine: ConversationStateMachine,
    summarizer: ConversationSummarizer,
    history: Arc<dyn HistoryStore>,
    default_budget: u32,
    thread_locks: Mutex<HashMap<ThreadId, Arc<AsyncMutex<()>>>>,
}

impl ConversationService {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        history: Arc<dyn HistoryStore>,
        config: &AgentConfig,
    ) -> Self {
        let system_prompt = config
            .system_prompt_override
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let summarizer =
            ConversationSummarizer::new(Arc::clone(&provider), config.summarize_after_messages);
        let machine = ConversationStateMachine::new(
            provider,
            ToolInvocationDispatcher::new(tools),
            system_prompt,
        )
        .with_max_history_messages(config.max_history_messages)
        .with_turn_timeout(Duration::from_secs(config.turn_timeout_secs));

        Self {
            machine,
            summarizer,
            history,
            default_budget: config.tool_call_budget,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn history_store(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Run one turn and report only its outcome.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, Error> {
        Ok(self.run_turn(request).await?.outcome)
    }

    /// Run one turn and return the full report (phases, counters, messages).
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnReport, Error> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ApiError::validation("message must not be empty").into());
        }

        let lock = self.thread_lock(&request.thread_id);
        let _turn = lock.lock().await;
        debug!(thread_id = %request.thread_id, "Acquired thread lock");

        let history = self.history.load(&request.thread_id).await?;
        let summary = self.history.load_summary(&request.thread_id).await?;
        let covered = summary.as_ref().map_or(0, |s| s.covered).min(history.len());
        let mut uncovered = history[covered..].to_vec();
        let total_before = history.len();

        let budget = request.tool_call_budget.unwrap_or(self.default_budget);
        let state = ConversationState::new(
            request.thread_id.clone(),
            history,
            message,
            budget,
            request.auth,
        )
        .with_summary(summary.clone());

        let report = self.machine.run(state).await;
        if report.outcome.is_finished() {
            self.history
                .append(&request.thread_id, &report.new_messages)
                .await?;
            info!(
                thread_id = %request.thread_id,
                appended = report.new_messages.len(),
                backend = self.history.name(),
                "Turn persisted"
            );

            uncovered.extend_from_slice(&report.new_messages);
            let total = total_before + report.new_messages.len();
            self.refresh_summary(&request.thread_id, summary.as_ref(), &uncovered, total)
                .await;
        }
        Ok(report)
    }

    /// Fold older messages into the thread summary when enough have piled
    /// up. Failures keep the previous summary; the turn is already stored.
    async fn refresh_summary(
        &self,
        thread: &ThreadId,
        previous: Option<&ThreadSummary>,
        uncovered: &[Message],
        total: usize,
    ) {
        if !self.summarizer.is_due(total, previous) {
            return;
        }
        let summary = match self.summarizer.summarize(previous, uncovered, total).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(thread_id = %thread, error = %err, "Summary update failed");
                return;
            }
        };
        match self.history.save_summary(thread, &summary).await {
            Ok(()) => info!(thread_id = %thread, covered = summary.covered, "Thread summarised"),
            Err(err) => warn!(thread_id = %thread, error = %err, "Failed to store summary"),
        }
    }

    /// Stored messages of a thread.
    pub async fn messages(&self, thread: &ThreadId) -> Result<Vec<Message>, HistoryError> {
        self.history.load(thread).await
    }

    pub async fn summary(&self, thread: &ThreadId) -> Result<Option<ThreadSummary>, HistoryError> {
        self.history.load_summary(thread).await
    }

    pub async fn threads(&self) -> Result<Vec<ThreadId>, HistoryError> {
        self.history.threads().await
    }

    fn thread_lock(&self, thread: &ThreadId) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop locks nobody is holding or waiting on.
        locks.retain(|id, lock| id == thread || Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(thread.clone()).or_default())
    }
}
