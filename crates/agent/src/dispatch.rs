//! Concurrent execution of one batch of tool calls.

use std::time::{Duration, Instant};

use finchat_core::error::ToolError;
use finchat_core::message::{Message, MessageToolCall};
use finchat_core::tool::{ToolCall, ToolRegistry};
use futures::future::join_all;
use tracing::{debug, warn};

/// The outcome of one tool call, already turned into a transcript message.
#[derive(Debug, Clone)]
pub struct DispatchedCall {
    pub id: String,
    pub name: String,
    pub success: bool,
    pub message: Message,
    pub duration_ms: u64,
}

/// Run every call of a batch concurrently and wait for all of them.
///
/// Never fails: unknown tools, invalid arguments, execution errors and
/// timeouts all become `Error: ...` tool messages the model can read.
/// Results are returned in request order.
pub async fn dispatch_batch(
    registry: &ToolRegistry,
    calls: &[MessageToolCall],
    timeout: Duration,
) -> Vec<DispatchedCall> {
    debug!(count = calls.len(), "Dispatching tool batch");
    join_all(calls.iter().map(|call| dispatch_one(registry, call, timeout))).await
}

async fn dispatch_one(registry: &ToolRegistry, call: &MessageToolCall, timeout: Duration) -> DispatchedCall {
    let start = Instant::now();

    let (success, content) = if registry.get(&call.name).is_none() {
        warn!(tool = %call.name, "Model requested an unknown tool");
        (
            false,
            format!(
                "Error: unknown tool '{}'. Available tools: {}",
                call.name,
                registry.names().join(", ")
            ),
        )
    } else {
        match tokio::time::timeout(timeout, registry.execute(&ToolCall::from(call))).await {
            Ok(Ok(result)) if result.success => (true, non_empty(result.output)),
            Ok(Ok(result)) => {
                warn!(tool = %call.name, "Tool reported failure");
                (false, format!("Error: {}", non_empty(result.output)))
            }
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (false, format!("Error: {e}"))
            }
            Err(_) => {
                let e = ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout,
                };
                warn!(tool = %call.name, timeout_ms = timeout.as_millis() as u64, "Tool timed out");
                (false, format!("Error: {e}"))
            }
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    debug!(tool = %call.name, success, duration_ms, "Tool call finished");

    DispatchedCall {
        id: call.id.clone(),
        name: call.name.clone(),
        success,
        message: Message::tool_result(&call.id, content),
        duration_ms,
    }
}

fn non_empty(output: String) -> String {
    if output.trim().is_empty() {
        "(no output)".into()
    } else {
        output
    }
}
