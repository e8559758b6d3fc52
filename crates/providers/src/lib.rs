//! LLM provider implementations for finchat.
//!
//! All providers implement the `finchat_core::Provider` trait. The agent
//! only ever sees the trait object.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
