//! In-memory history store: useful for testing and ephemeral sessions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use freshmate_core::error::HistoryError;
use freshmate_core::history::{HistoryStore, ThreadSummary};
use freshmate_core::message::{Message, ThreadId};

/// Threads live in a map for the lifetime of the process.
pub struct InMemoryHistoryStore {
    threads: Arc<RwLock<HashMap<ThreadId, Vec<Message>>>>,
    summaries: RwLock<HashMap<ThreadId, ThreadSummary>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
            summaries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, thread: &ThreadId) -> Result<Vec<Message>, HistoryError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, thread: &ThreadId, messages: &[Message]) -> Result<(), HistoryError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.threads
            .write()
            .await
            .entry(thread.clone())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<ThreadId>, HistoryError> {
        let mut ids: Vec<ThreadId> = self.threads.read().await.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn load_summary(&self, thread: &ThreadId) -> Result<Option<ThreadSummary>, HistoryError> {
        Ok(self.summaries.read().await.get(thread).cloned())
    }

    async fn save_summary(&self, thread: &ThreadId, summary: &ThreadSummary) -> Result<(), HistoryError> {
        self.summaries
            .write()
            .await
            .insert(thread.clone(), summary.clone());
        Ok(())
    }
}
