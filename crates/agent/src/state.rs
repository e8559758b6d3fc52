//! The agent loop as an explicit state machine.
//!
//! ```text
//!                 tool calls, budget left
//!   AwaitingModel ───────────────────────▶ AwaitingTools
//!        │  ▲                                   │
//!        │  └───────────────────────────────────┘
//!        │            batch answered
//!        ├── no tool calls ──────────▶ Done
//!        └── tool calls, budget spent ▶ RoundTripLimitReached
//! ```
//!
//! [`transition`] is pure: it looks at the current state, the last appended
//! message and the round-trip counters, nothing else.

use finchat_core::message::{Message, Role};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Waiting for the model to answer the current transcript.
    AwaitingModel,
    /// Waiting for every tool call of the latest assistant message.
    AwaitingTools,
    /// The model answered without requesting tools.
    Done,
    /// The model kept requesting tools after the round-trip budget ran out.
    RoundTripLimitReached,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::RoundTripLimitReached)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingModel => "awaiting_model",
            Self::AwaitingTools => "awaiting_tools",
            Self::Done => "done",
            Self::RoundTripLimitReached => "round_trip_limit_reached",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{0} is terminal and has no successor")]
    Terminal(LoopState),

    #[error("{state} expects the last message to come from the assistant, found {found:?}")]
    UnexpectedMessage { state: LoopState, found: Option<Role> },
}

impl From<TransitionError> for finchat_core::Error {
    fn from(e: TransitionError) -> Self {
        let from = match &e {
            TransitionError::Terminal(state) => *state,
            TransitionError::UnexpectedMessage { state, .. } => *state,
        };
        finchat_core::Error::InvalidTransition {
            from: from.to_string(),
            reason: e.to_string(),
        }
    }
}

/// The routing predicate: does the last message ask for tools?
pub fn routes_to_tools(last: &Message) -> bool {
    last.requests_tools()
}

/// Compute the successor of `state`.
///
/// `round_trips` counts completed model → tools → model cycles.
pub fn transition(
    state: LoopState,
    last: Option<&Message>,
    round_trips: u32,
    max_round_trips: u32,
) -> Result<LoopState, TransitionError> {
    match state {
        LoopState::AwaitingModel => {
            let last = last.filter(|m| m.role == Role::Assistant).ok_or(
                TransitionError::UnexpectedMessage {
                    state,
                    found: last.map(|m| m.role),
                },
            )?;
            if !routes_to_tools(last) {
                Ok(LoopState::Done)
            } else if round_trips < max_round_trips {
                Ok(LoopState::AwaitingTools)
            } else {
                Ok(LoopState::RoundTripLimitReached)
            }
        }
        LoopState::AwaitingTools => Ok(LoopState::AwaitingModel),
        LoopState::Done | LoopState::RoundTripLimitReached => Err(TransitionError::Terminal(state)),
    }
}
