//! # Freshmate Core
//!
//! Domain types, traits, and error definitions for the Freshmate pantry
//! assistant. Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! Each seam is a trait defined here. Implementations live in their
//! respective crates:
//! - [`ModelProvider`] - the language model (providers crate)
//! - [`Tool`] - agent capabilities (tools crate)
//! - [`HistoryStore`] - conversation persistence (memory crate)

pub mod auth;
pub mod error;
pub mod history;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use auth::{AuthContext, AuthSource};
pub use error::{ApiError, Error, ErrorKind, HistoryError, Result, ToolError};
pub use history::{HistoryStore, ThreadSummary};
pub use message::{Message, ThreadId};
pub use provider::{ModelProvider, ModelRequest, ModelResponse, ToolDefinition};
pub use tool::{Tool, ToolCallRequest, ToolCallResult, ToolRegistry};
