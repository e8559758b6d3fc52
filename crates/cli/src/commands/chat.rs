//! `finchat chat`: Ask one question from the terminal.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use finchat_agent::{AgentLoop, AgentStreamEvent, EventStreamAdapter, StreamPolicy};
use finchat_config::AppConfig;
use finchat_core::message::{Conversation, Message};
use finchat_providers::OpenAiCompatProvider;
use futures::{Stream, StreamExt};

pub async fn run(message: &str, stream: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let provider = OpenAiCompatProvider::from_config(&config).context("Model provider is not configured")?;

    let agent = AgentLoop::from_config(
        Arc::new(provider),
        Arc::new(finchat_tools::default_registry()),
        &config,
    );
    let conversation = Conversation::from_messages([Message::user(message)]);

    if stream {
        let rx = agent.run_stream(conversation)?;
        let events = EventStreamAdapter::new(
            rx,
            StreamPolicy {
                expose_agent_events: true,
            },
        );
        render_stream(events, &mut std::io::stdout(), &mut std::io::stderr()).await
    } else {
        eprint!("  Thinking...");
        let outcome = agent.run(conversation).await;
        eprint!("\r              \r");
        let outcome = outcome?;
        println!("{}", outcome.answer);
        eprintln!(
            "  ({} round trips, {} tool calls)",
            outcome.round_trips, outcome.tool_calls_made
        );
        Ok(())
    }
}

/// Answer text goes to `out`, tool activity and the summary to `status`.
async fn render_stream<S>(mut events: S, out: &mut impl Write, status: &mut impl Write) -> anyhow::Result<()>
where
    S: Stream<Item = AgentStreamEvent> + Unpin,
{
    while let Some(event) = events.next().await {
        match event {
            AgentStreamEvent::Chunk { content } => {
                write!(out, "{content}")?;
                out.flush()?;
            }
            AgentStreamEvent::Thought { content } => writeln!(status, "  … {}", content.trim())?,
            AgentStreamEvent::ToolCall { name, input, .. } => writeln!(status, "  → {name} {input}")?,
            AgentStreamEvent::ToolResult { name, success, .. } => {
                writeln!(status, "  ← {name} {}", if success { "ok" } else { "failed" })?
            }
            AgentStreamEvent::Done {
                round_trips,
                tool_calls_made,
                ..
            } => {
                writeln!(out)?;
                writeln!(status, "  ({round_trips} round trips, {tool_calls_made} tool calls)")?;
            }
            AgentStreamEvent::Error { message } => {
                writeln!(out)?;
                bail!(message);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn render(events: Vec<AgentStreamEvent>) -> (String, String, anyhow::Result<()>) {
        let mut out = Vec::new();
        let mut status = Vec::new();
        let result = render_stream(stream::iter(events), &mut out, &mut status).await;
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(status).unwrap(),
            result,
        )
    }

    #[tokio::test]
    async fn answer_and_activity_are_separated() {
        let (out, status, result) = render(vec![
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
            AgentStreamEvent::Chunk { content: "NVIDIA ".into() },
            AgentStreamEvent::Chunk { content: "rose.".into() },
            AgentStreamEvent::Done {
                conversation_id: "abc".into(),
                usage: None,
                round_trips: 1,
                tool_calls_made: 1,
            },
        ])
        .await;

        result.unwrap();
        assert_eq!(out, "NVIDIA rose.\n");
        assert!(status.contains("duckduckgo_search"));
        assert!(status.contains("1 round trips, 1 tool calls"));
    }

    #[tokio::test]
    async fn error_event_fails_the_command() {
        let (out, _status, result) = render(vec![
            AgentStreamEvent::Chunk { content: "partial".into() },
            AgentStreamEvent::Error {
                message: "Provider error: Request timed out".into(),
            },
        ])
        .await;

        assert_eq!(out, "partial\n");
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }
}
