//! History store trait: per-thread conversation persistence.
//!
//! A store only ever receives messages from turns that finished; aborted
//! turns leave the thread untouched. Next to the message log each thread
//! may carry one rolling [`ThreadSummary`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;
use crate::message::{Message, ThreadId};

/// Condensed account of the older part of a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub text: String,

    /// Number of leading messages the summary stands in for.
    pub covered: usize,

    pub updated_at: DateTime<Utc>,
}

impl ThreadSummary {
    pub fn new(text: impl Into<String>, covered: usize) -> Self {
        Self {
            text: text.into(),
            covered,
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Human-readable backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// All messages of a thread in append order. Unknown threads are empty.
    async fn load(&self, thread: &ThreadId) -> std::result::Result<Vec<Message>, HistoryError>;

    /// Append messages to the end of a thread.
    async fn append(
        &self,
        thread: &ThreadId,
        messages: &[Message],
    ) -> std::result::Result<(), HistoryError>;

    /// Known thread IDs.
    async fn threads(&self) -> std::result::Result<Vec<ThreadId>, HistoryError>;

    /// The thread's current summary, if one has been written.
    async fn load_summary(
        &self,
        thread: &ThreadId,
    ) -> std::result::Result<Option<ThreadSummary>, HistoryError>;

    /// Replace the thread's summary.
    async fn save_summary(
        &self,
        thread: &ThreadId,
        summary: &ThreadSummary,
    ) -> std::result::Result<(), HistoryError>;
}
