//! Conversation history stores for Freshmate.

pub mod file_backend;
pub mod in_memory;

use std::sync::Arc;

use freshmate_config::{HistoryBackend, HistoryConfig};
use freshmate_core::HistoryStore;

pub use file_backend::FileHistoryStore;
pub use in_memory::InMemoryHistoryStore;

/// Build the store selected by the `[history]` config section.
pub fn from_config(config: &HistoryConfig) -> Arc<dyn HistoryStore> {
    match config.backend {
        HistoryBackend::Memory => Arc::new(InMemoryHistoryStore::new()),
        HistoryBackend::File => Arc::new(FileHistoryStore::new(config.resolved_dir())),
    }
}
