//! # finchat Core
//!
//! Domain types, traits, and error definitions for the finchat assistant backend.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the provider, tool, agent and gateway crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: messages and the append-only [`Conversation`]
//! - [`tool`]: the [`Tool`] trait and the read-only [`ToolRegistry`]
//! - [`provider`]: the [`Provider`] trait over language-model backends
//! - [`error`]: one error enum per bounded context

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role, TranscriptError};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
