//! Shaping stored history into what the model is allowed to see.
//!
//! Chat-completion APIs reject a tool-call message that is not followed by
//! an answer for each of its calls, and tool observations that do not
//! follow a tool-call message. Every model request goes through
//! [`prepare`]; the stored log itself is never touched.

use std::collections::HashSet;

use freshmate_core::Message;

/// Drop incomplete tool exchanges and orphan observations.
pub fn sanitize(messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let message = &messages[i];
        match message {
            Message::ToolObservation { .. } => {
                // Not preceded by a complete exchange.
                i += 1;
            }
            Message::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                let wanted: HashSet<&str> = tool_calls.iter().map(|c| c.id.as_str()).collect();
                let mut end = i + 1;
                while end < messages.len() && messages[end].is_observation() {
                    end += 1;
                }
                let observations = &messages[i + 1..end];
                let answered: HashSet<&str> = observations
                    .iter()
                    .filter_map(|m| match m {
                        Message::ToolObservation { call_id, .. } => Some(call_id.as_str()),
                        _ => None,
                    })
                    .collect();

                if wanted.is_subset(&answered) {
                    out.push(message.clone());
                    out.extend(
                        observations
                            .iter()
                            .filter(|m| match m {
                                Message::ToolObservation { call_id, .. } => {
                                    wanted.contains(call_id.as_str())
                                }
                                _ => false,
                            })
                            .cloned(),
                    );
                }
                i = end;
            }
            _ => {
                out.push(message.clone());
                i += 1;
            }
        }
    }
    out
}

/// Keep roughly the most recent `max` messages. `0` means unlimited.
///
/// The window always reaches back to the latest user message, and a window
/// that would open on an observation is widened to include the tool-call
/// message it answers. Either rule may keep more than `max` messages.
pub fn window(mut messages: Vec<Message>, max: usize) -> Vec<Message> {
    if max == 0 || messages.len() <= max {
        return messages;
    }
    let mut start = messages.len() - max;
    if let Some(last_user) = messages.iter().rposition(Message::is_user) {
        start = start.min(last_user);
    }
    while start > 0 && messages[start].is_observation() {
        start -= 1;
    }
    messages.split_off(start)
}

/// History as sent to the model: sanitized, then windowed.
pub fn prepare(messages: &[Message], max: usize) -> Vec<Message> {
    window(sanitize(messages), max)
}
