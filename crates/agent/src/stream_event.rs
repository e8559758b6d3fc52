//! Agent-level streaming events and the outward stream adapter.
//!
//! `AgentStreamEvent` wraps provider-level stream chunks into higher-level
//! events. [`EventStreamAdapter`] filters them for the wire and guarantees
//! the outward stream closes exactly once.

use std::pin::Pin;
use std::task::{Context, Poll};

use finchat_core::provider::Usage;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the agent during streaming execution.
///
/// - `chunk`: partial text of the final answer
/// - `thought`: text produced while the model decides on tools
/// - `tool_call`: agent is invoking a tool
/// - `tool_result`: tool execution completed
/// - `done`: stream is complete
/// - `error`: an error occurred
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text token from the LLM.
    Chunk { content: String },

    /// Text from a turn that signalled tool use.
    Thought { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The stream is complete, with final metadata.
    Done {
        conversation_id: String,
        usage: Option<Usage>,
        round_trips: u32,
        tool_calls_made: usize,
    },

    /// An error occurred mid-stream.
    Error { message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Which events reach the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPolicy {
    /// Forward thoughts and tool activity, not just the answer.
    pub expose_agent_events: bool,
}

impl StreamPolicy {
    pub fn forwards(&self, event: &AgentStreamEvent) -> bool {
        match event {
            AgentStreamEvent::Chunk { .. } | AgentStreamEvent::Done { .. } | AgentStreamEvent::Error { .. } => true,
            AgentStreamEvent::Thought { .. }
            | AgentStreamEvent::ToolCall { .. }
            | AgentStreamEvent::ToolResult { .. } => self.expose_agent_events,
        }
    }
}

pub(crate) const PRODUCER_VANISHED: &str = "agent stream ended unexpectedly";

/// Outward view of an agent event channel.
///
/// Yields at most one terminal event and then ends. If the producer drops
/// its sender without a terminal event, a single `Error` is synthesized.
pub struct EventStreamAdapter {
    rx: mpsc::Receiver<AgentStreamEvent>,
    policy: StreamPolicy,
    finished: bool,
}

impl EventStreamAdapter {
    pub fn new(rx: mpsc::Receiver<AgentStreamEvent>, policy: StreamPolicy) -> Self {
        Self {
            rx,
            policy,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        // Lets the producer observe the hang-up on its next send.
        self.rx.close();
    }
}

impl Stream for EventStreamAdapter {
    type Item = AgentStreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }
            match this.rx.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(event)) if event.is_terminal() => {
                    this.finish();
                    return Poll::Ready(Some(event));
                }
                Poll::Ready(Some(event)) => {
                    if this.policy.forwards(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(Some(AgentStreamEvent::Error {
                        message: PRODUCER_VANISHED.into(),
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn chunk(s: &str) -> AgentStreamEvent {
        AgentStreamEvent::Chunk { content: s.into() }
    }

    fn done() -> AgentStreamEvent {
        AgentStreamEvent::Done {
            conversation_id: "abc".into(),
            usage: None,
            round_trips: 1,
            tool_calls_made: 1,
        }
    }

    async fn collect(events: Vec<AgentStreamEvent>, policy: StreamPolicy) -> Vec<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(16);
        for e in events {
            tx.send(e).await.unwrap();
        }
        drop(tx);
        EventStreamAdapter::new(rx, policy).collect().await
    }

    #[test]
    fn event_serialization_chunk() {
        let json = serde_json::to_string(&chunk("Hello")).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_done() {
        let event = AgentStreamEvent::Done {
            conversation_id: "abc".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 20,
                total_tokens: 30,
            }),
            round_trips: 2,
            tool_calls_made: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""round_trips":2"#));
    }

    #[test]
    fn event_type_names() {
        assert_eq!(chunk("x").event_type(), "chunk");
        assert_eq!(AgentStreamEvent::Thought { content: "x".into() }.event_type(), "thought");
        assert_eq!(
            AgentStreamEvent::ToolCall {
                id: "a".into(),
                name: "b".into(),
                input: serde_json::Value::Null
            }
            .event_type(),
            "tool_call"
        );
        assert_eq!(done().event_type(), "done");
        assert_eq!(AgentStreamEvent::Error { message: "x".into() }.event_type(), "error");
    }

    #[test]
    fn event_deserialization() {
        let event: AgentStreamEvent = serde_json::from_str(r#"{"type":"chunk","content":"hi"}"#).unwrap();
        assert_eq!(event, chunk("hi"));
    }

    #[tokio::test]
    async fn default_policy_hides_agent_events() {
        let out = collect(
            vec![
                AgentStreamEvent::Thought { content: "hmm".into() },
                AgentStreamEvent::ToolCall {
                    id: "c1".into(),
                    name: "duckduckgo_search".into(),
                    input: serde_json::json!({"query": "NVDA"}),
                },
                AgentStreamEvent::ToolResult {
                    id: "c1".into(),
                    name: "duckduckgo_search".into(),
                    output: "results".into(),
                    success: true,
                },
                chunk("NVIDIA "),
                chunk("rallied."),
                done(),
            ],
            StreamPolicy::default(),
        )
        .await;
        assert_eq!(out, vec![chunk("NVIDIA "), chunk("rallied."), done()]);
    }

    #[tokio::test]
    async fn exposing_policy_forwards_everything() {
        let out = collect(
            vec![AgentStreamEvent::Thought { content: "hmm".into() }, chunk("ok"), done()],
            StreamPolicy {
                expose_agent_events: true,
            },
        )
        .await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].event_type(), "thought");
    }

    #[tokio::test]
    async fn closes_after_first_terminal_event() {
        let out = collect(
            vec![chunk("a"), done(), chunk("late"), AgentStreamEvent::Error { message: "late".into() }],
            StreamPolicy::default(),
        )
        .await;
        assert_eq!(out, vec![chunk("a"), done()]);
    }

    #[tokio::test]
    async fn vanished_producer_yields_single_error() {
        let out = collect(vec![chunk("partial")], StreamPolicy::default()).await;
        assert_eq!(
            out,
            vec![
                chunk("partial"),
                AgentStreamEvent::Error {
                    message: PRODUCER_VANISHED.into()
                }
            ]
        );
    }

    #[tokio::test]
    async fn finishing_hangs_up_on_producer() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(done()).await.unwrap();
        let mut adapter = EventStreamAdapter::new(rx, StreamPolicy::default());
        assert_eq!(adapter.next().await, Some(done()));
        assert_eq!(adapter.next().await, None);
        assert!(tx.send(chunk("after")).await.is_err());
    }
}
