//! The agent loop at the heart of finchat.
//!
//! The loop is a small state machine:
//!
//! 1. **AwaitingModel**: send the transcript (plus system prompt and tool
//!    definitions) to the model and append its reply
//! 2. **AwaitingTools**: if the reply requests tools, run them concurrently,
//!    append one tool message per call in request order, go back to 1
//! 3. **Done**: the reply had no tool calls; its content is the answer
//!
//! A configurable round-trip budget turns a model that never stops asking
//! for tools into an error instead of an endless loop.

pub mod dispatch;
pub mod invoker;
pub mod loop_runner;
pub mod state;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use dispatch::{DispatchedCall, dispatch_batch};
pub use invoker::{ModelInvoker, ModelReply, ModelSettings, ROUTING_TEMPERATURE_CEILING};
pub use loop_runner::{AgentLoop, LoopOutcome};
pub use state::{LoopState, TransitionError, routes_to_tools, transition};
pub use stream_event::{AgentStreamEvent, EventStreamAdapter, StreamPolicy};
