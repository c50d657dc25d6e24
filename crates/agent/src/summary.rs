//! Rolling conversation summaries.
//!
//! Once enough messages pile up past the last summary, the older part of a
//! thread is retold as a short narrative and folded into the summary by the
//! model. The state machine then sends only the summary (in the system
//! prompt) plus the messages it does not cover.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use freshmate_core::{ApiError, Message, ModelProvider, ModelRequest, ThreadSummary};

/// Messages left out of every new summary so the model still sees the
/// latest exchange verbatim.
const KEEP_RECENT: usize = 2;

/// Observations longer than this are narrated without their payload.
const OBSERVATION_INLINE_LIMIT: usize = 200;

const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You write concise summaries of conversations between a user and a pantry assistant.";

const FIRST_SUMMARY_PROMPT: &str = "\
Summarize this conversation between a user and Freshmate, an assistant that \
manages their food inventory, tracks expiry dates and finds recipes.

Focus on:
1. Key facts about the user's pantry
2. Products that are expiring or expired
3. Recipes or meal plans discussed
4. Preferences or dietary needs the user mentioned
5. Open tasks or follow-ups

Keep it short but keep product names, dates and preferences.";

pub struct ConversationSummarizer {
    provider: Arc<dyn ModelProvider>,
    threshold: usize,
}

impl ConversationSummarizer {
    /// `threshold` is the number of uncovered messages that triggers a new
    /// summary; `0` disables summarising.
    pub fn new(provider: Arc<dyn ModelProvider>, threshold: usize) -> Self {
        Self {
            provider,
            threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether a thread of `len` messages has outgrown `previous`.
    pub fn is_due(&self, len: usize, previous: Option<&ThreadSummary>) -> bool {
        let covered = previous.map_or(0, |s| s.covered);
        self.threshold > 0
            && len.saturating_sub(covered) >= self.threshold
            && len.saturating_sub(KEEP_RECENT) > covered
    }

    /// Fold `uncovered` (the thread's messages after `previous.covered`)
    /// into a new summary. `total` is the thread length.
    pub async fn summarize(
        &self,
        previous: Option<&ThreadSummary>,
        uncovered: &[Message],
        total: usize,
    ) -> Result<ThreadSummary, ApiError> {
        let covered_before = previous.map_or(0, |s| s.covered);
        let covered = total.saturating_sub(KEEP_RECENT).max(covered_before);
        let fold = &uncovered[..covered.saturating_sub(covered_before).min(uncovered.len())];

        let narrative = narrate(fold);
        let prompt = match previous {
            Some(summary) => format!(
                "This is a summary of the conversation to date: {}\n\n\
                 Recent conversation:\n{narrative}\n\n\
                 Extend the summary by taking into account the new messages above.",
                summary.text
            ),
            None => format!("{FIRST_SUMMARY_PROMPT}\n\nRecent conversation:\n{narrative}"),
        };

        let response = self
            .provider
            .complete(ModelRequest {
                system_prompt: SUMMARIZER_SYSTEM_PROMPT.into(),
                messages: vec![Message::user(prompt)],
                tools: Vec::new(),
            })
            .await?;

        let text = response.content.trim();
        if text.is_empty() || !response.is_final() {
            return Err(ApiError::unexpected("summary request returned no text"));
        }
        debug!(folded = fold.len(), covered, "Summary updated");
        Ok(ThreadSummary::new(text, covered))
    }
}

/// Retell messages as plain `Speaker: text` lines.
fn narrate(messages: &[Message]) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            Message::User { content, .. } => lines.push(format!("User: {content}")),
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                if !tool_calls.is_empty() {
                    let used: Vec<String> =
                        tool_calls.iter().map(|c| format!("used {}", c.name)).collect();
                    lines.push(format!("Assistant: {}", used.join(", ")));
                }
                if !content.trim().is_empty() {
                    lines.push(format!("Assistant: {content}"));
                }
            }
            Message::ToolObservation {
                tool_name, content, ..
            } => lines.push(narrate_observation(tool_name, content)),
        }
    }
    lines.join("\n")
}

fn narrate_observation(tool: &str, content: &str) -> String {
    let envelope: Option<Value> = serde_json::from_str(content).ok();
    if let Some(Value::Bool(false)) = envelope.as_ref().and_then(|v| v.get("success")) {
        let error = envelope
            .as_ref()
            .and_then(|v| v.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return format!("{tool} failed: {error}");
    }
    if content.len() > OBSERVATION_INLINE_LIMIT {
        format!("{tool} returned data (truncated)")
    } else {
        format!("{tool} returned: {content}")
    }
}
