//! The conversation loop.
//!
//! A turn follows **model → tools → observations → model** until the model
//! answers without tool calls, the tool-call budget runs out, or the turn
//! deadline passes:
//!
//! 1. **Load** the thread's history and summary, append the user message
//! 2. **Ask the model** with the summary, the uncovered history and tool definitions
//! 3. **If tool calls**: charge the budget, dispatch the batch, append observations, go to 2
//! 4. **If an answer**: persist the turn, refresh the summary if due, return the answer
//!
//! Aborted turns leave the stored history untouched.

pub mod dispatcher;
pub mod history;
pub mod service;
pub mod state_machine;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{DispatchError, ToolInvocationDispatcher};
pub use service::{ConversationService, DEFAULT_SYSTEM_PROMPT, TurnRequest};
pub use state_machine::{
    AbortReason, ConversationState, ConversationStateMachine, TurnOutcome, TurnPhase, TurnReport,
};
pub use summary::ConversationSummarizer;
