//! The conversation state machine: one turn of think, act, observe.
//!
//! ```text
//! AwaitingModel ──▶ ModelResponded ──▶ Finished(answer)
//!       ▲                 │
//!       │                 ▼
//! ObservationsAppended ◀─ DispatchingTools
//! ```
//!
//! Any state may end in `Aborted(reason)`: the model call failed, the batch
//! did not fit the remaining tool-call budget, a tool task crashed, or the
//! turn deadline passed. Every phase entered is recorded in the
//! [`TurnReport`] so a turn can be inspected after the fact.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use freshmate_core::{
    ApiError, AuthContext, Message, ModelProvider, ModelRequest, ThreadId, ThreadSummary,
    ToolCallRequest, ToolDefinition,
};

use crate::dispatcher::ToolInvocationDispatcher;
use crate::history;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingModel,
    ModelResponded,
    DispatchingTools,
    ObservationsAppended,
    Finished,
    Aborted,
}

/// Why a turn stopped without an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    BudgetExceeded { requested: u32, remaining: u32 },
    FatalTool(String),
    ModelCall(ApiError),
    Timeout,
}

impl AbortReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::FatalTool(_) => "fatal_tool_error",
            Self::ModelCall(_) => "model_call_failed",
            Self::Timeout => "turn_timeout",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExceeded {
                requested,
                remaining,
            } => write!(
                f,
                "{}: model requested {requested} tool call(s) with {remaining} remaining",
                self.code()
            ),
            Self::FatalTool(detail) => write!(f, "{}: {detail}", self.code()),
            Self::ModelCall(err) => write!(f, "{}: {}: {}", self.code(), err.kind(), err.message()),
            Self::Timeout => write!(f, "{}: turn deadline exceeded", self.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Finished { answer: String },
    Aborted { reason: AbortReason },
}

impl TurnOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Everything one turn owns. Mutated only by the state machine.
#[derive(Clone)]
pub struct ConversationState {
    pub thread_id: ThreadId,
    pub messages: Vec<Message>,
    pub tool_call_budget_remaining: u32,
    pub auth: AuthContext,
    /// Stands in for the leading messages it covers.
    pub summary: Option<ThreadSummary>,
    persisted: usize,
}

impl ConversationState {
    /// Seed a turn with the persisted history followed by the user's message.
    pub fn new(
        thread_id: ThreadId,
        history: Vec<Message>,
        user_message: impl Into<String>,
        tool_call_budget: u32,
        auth: AuthContext,
    ) -> Self {
        let persisted = history.len();
        let mut messages = history;
        messages.push(Message::user(user_message));
        Self {
            thread_id,
            messages,
            tool_call_budget_remaining: tool_call_budget,
            auth,
            summary: None,
            persisted,
        }
    }

    pub fn with_summary(mut self, summary: Option<ThreadSummary>) -> Self {
        self.summary = summary;
        self
    }

    /// Messages the summary does not cover. This turn's messages are always
    /// included.
    pub fn uncovered(&self) -> &[Message] {
        let covered = self.summary.as_ref().map_or(0, |s| s.covered);
        &self.messages[covered.min(self.persisted)..]
    }

    /// Messages produced by this turn (user message included).
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.persisted..]
    }
}

/// The result of running one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub phases: Vec<TurnPhase>,
    pub model_calls: u32,
    pub dispatch_cycles: u32,
    pub tool_calls: u32,
    /// Messages to persist. Empty unless the turn finished.
    pub new_messages: Vec<Message>,
}

#[derive(Default)]
struct Progress {
    phases: Vec<TurnPhase>,
    model_calls: u32,
    dispatch_cycles: u32,
    tool_calls: u32,
}

impl Progress {
    fn enter(&mut self, phase: TurnPhase) {
        self.phases.push(phase);
    }
}

pub struct ConversationStateMachine {
    provider: Arc<dyn ModelProvider>,
    dispatcher: ToolInvocationDispatcher,
    tools: Vec<ToolDefinition>,
    system_prompt: String,
    max_history_messages: usize,
    turn_timeout: Duration,
}

impl ConversationStateMachine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        dispatcher: ToolInvocationDispatcher,
        system_prompt: impl Into<String>,
    ) -> Self {
        let tools = dispatcher.registry().definitions();
        Self {
            provider,
            dispatcher,
            tools,
            system_prompt: system_prompt.into(),
            max_history_messages: 0,
            turn_timeout: Duration::from_secs(120),
        }
    }

    /// Limit the history sent to the model. `0` means unlimited.
    pub fn with_max_history_messages(mut self, max: usize) -> Self {
        self.max_history_messages = max;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Drive a turn to a terminal state within the turn deadline.
    pub async fn run(&self, mut state: ConversationState) -> TurnReport {
        let mut progress = Progress::default();
        info!(
            thread_id = %state.thread_id,
            history = state.persisted,
            budget = state.tool_call_budget_remaining,
            token = %state.auth.fingerprint(),
            "Turn started"
        );

        let deadline = tokio::time::timeout(self.turn_timeout, self.drive(&mut state, &mut progress)).await;
        let outcome = match deadline {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(thread_id = %state.thread_id, timeout = ?self.turn_timeout, "Turn deadline exceeded");
                TurnOutcome::Aborted {
                    reason: AbortReason::Timeout,
                }
            }
        };

        match &outcome {
            TurnOutcome::Finished { .. } => {
                progress.enter(TurnPhase::Finished);
                info!(
                    thread_id = %state.thread_id,
                    model_calls = progress.model_calls,
                    dispatch_cycles = progress.dispatch_cycles,
                    "Turn finished"
                );
            }
            TurnOutcome::Aborted { reason } => {
                progress.enter(TurnPhase::Aborted);
                warn!(thread_id = %state.thread_id, reason = %reason, "Turn aborted");
            }
        }

        let new_messages = if outcome.is_finished() {
            state.new_messages().to_vec()
        } else {
            Vec::new()
        };

        TurnReport {
            outcome,
            phases: progress.phases,
            model_calls: progress.model_calls,
            dispatch_cycles: progress.dispatch_cycles,
            tool_calls: progress.tool_calls,
            new_messages,
        }
    }

    fn model_request(&self, state: &ConversationState) -> ModelRequest {
        let system_prompt = match &state.summary {
            Some(summary) => format!(
                "{}\n\nSummary of the conversation so far: {}",
                self.system_prompt, summary.text
            ),
            None => self.system_prompt.clone(),
        };
        ModelRequest {
            system_prompt,
            messages: history::prepare(state.uncovered(), self.max_history_messages),
            tools: self.tools.clone(),
        }
    }

    async fn drive(&self, state: &mut ConversationState, progress: &mut Progress) -> TurnOutcome {
        loop {
            // AwaitingModel -> ModelResponded
            progress.enter(TurnPhase::AwaitingModel);
            let request = self.model_request(state);
            progress.model_calls += 1;
            debug!(
                thread_id = %state.thread_id,
                call = progress.model_calls,
                messages = request.messages.len(),
                "Calling model"
            );
            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(err) => {
                    return TurnOutcome::Aborted {
                        reason: AbortReason::ModelCall(err),
                    };
                }
            };
            progress.enter(TurnPhase::ModelResponded);

            // ModelResponded -> Finished
            if response.is_final() {
                state.messages.push(Message::assistant(response.content.clone()));
                return TurnOutcome::Finished {
                    answer: response.content,
                };
            }

            // ModelResponded -> DispatchingTools
            let calls = assign_missing_ids(response.tool_calls, progress.tool_calls);
            let requested = u32::try_from(calls.len()).unwrap_or(u32::MAX);
            if requested > state.tool_call_budget_remaining {
                return TurnOutcome::Aborted {
                    reason: AbortReason::BudgetExceeded {
                        requested,
                        remaining: state.tool_call_budget_remaining,
                    },
                };
            }
            state.tool_call_budget_remaining -= requested;
            progress.tool_calls += requested;
            state
                .messages
                .push(Message::assistant_with_calls(response.content, calls.clone()));

            progress.enter(TurnPhase::DispatchingTools);
            progress.dispatch_cycles += 1;
            let results = match self.dispatcher.dispatch(&calls, &state.auth).await {
                Ok(results) => results,
                Err(err) => {
                    return TurnOutcome::Aborted {
                        reason: AbortReason::FatalTool(err.to_string()),
                    };
                }
            };

            // DispatchingTools -> ObservationsAppended
            let failed = results.iter().filter(|r| !r.is_success()).count();
            debug!(
                thread_id = %state.thread_id,
                calls = results.len(),
                failed,
                budget_left = state.tool_call_budget_remaining,
                "Tool batch complete"
            );
            state
                .messages
                .extend(results.into_iter().map(|r| r.into_message()));
            progress.enter(TurnPhase::ObservationsAppended);
        }
    }
}

/// Give every call a unique, non-empty ID so each observation can be
/// matched back to its call.
fn assign_missing_ids(calls: Vec<ToolCallRequest>, already_made: u32) -> Vec<ToolCallRequest> {
    let mut seen = std::collections::HashSet::new();
    let mut next = already_made as usize;
    calls
        .into_iter()
        .map(|mut call| {
            next += 1;
            if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
                // Generated ids must not collide with ids already in the batch.
                let mut candidate = format!("call_{next}");
                while !seen.insert(candidate.clone()) {
                    next += 1;
                    candidate = format!("call_{next}");
                }
                call.id = candidate;
            }
            call
        })
        .collect()
}
