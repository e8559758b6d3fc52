//! Built-in tool implementations for finchat.
//!
//! The assistant ships with a single tool: web search through DuckDuckGo.

pub mod web_search;

use finchat_core::tool::ToolRegistry;

pub use web_search::DuckDuckGoSearchTool;

/// Create the default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(DuckDuckGoSearchTool::new()));
    registry
}
