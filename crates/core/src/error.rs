//! Error types for the finchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] ties them together.

use std::time::Duration;

use thiserror::Error;

/// The top-level error type for all finchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Request validation (rejected before the agent loop starts) ---
    #[error("Validation error: {0}")]
    Validation(String),

    // --- Agent loop ---
    #[error("Agent exceeded the limit of {limit} model/tool round trips")]
    RoundTripLimitExceeded { limit: u32 },

    #[error("Invalid agent transition from {from}: {reason}")]
    InvalidTransition { from: String, reason: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A failed model invocation.
///
/// Distinct from a successful response that simply carries no tool calls.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout:?}")]
    Timeout { tool_name: String, timeout: Duration },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
