//! Model provider implementations for Freshmate.
//!
//! All providers implement the `freshmate_core::ModelProvider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
