//! Model invocation in batch and streaming mode.
//!
//! Both modes produce the same thing: one assembled assistant message,
//! possibly carrying tool calls. Streaming additionally pushes text
//! fragments into an event sink while the turn is in flight.

use std::sync::Arc;
use std::time::Duration;

use finchat_config::AppConfig;
use finchat_core::error::ProviderError;
use finchat_core::message::{Conversation, Message, MessageToolCall};
use finchat_core::provider::{Provider, ProviderRequest, Usage};
use finchat_core::tool::ToolRegistry;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::stream_event::AgentStreamEvent;

/// Upper bound on temperature for turns that advertise tools.
pub const ROUTING_TEMPERATURE_CEILING: f32 = 0.2;

/// Model settings shared read-only by every request.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
    /// Prepended to every request, never stored in the transcript.
    pub system_prompt: Option<String>,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            timeout: Duration::from_secs(60),
            system_prompt: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.name.clone(),
            temperature: config.model.temperature,
            max_tokens: Some(config.model.max_tokens),
            timeout: Duration::from_secs(config.model.timeout_secs),
            system_prompt: Some(config.agent.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
        }
    }
}

/// One completed model turn.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub message: Message,
    pub usage: Option<Usage>,
}

#[derive(Clone)]
pub struct ModelInvoker {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    settings: ModelSettings,
}

impl ModelInvoker {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, settings: ModelSettings) -> Self {
        Self {
            provider,
            tools,
            settings,
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ModelSettings {
        &mut self.settings
    }

    fn build_request(&self, conversation: &Conversation, stream: bool) -> ProviderRequest {
        let tools = self.tools.definitions();
        let temperature = if tools.is_empty() {
            self.settings.temperature
        } else {
            self.settings.temperature.min(ROUTING_TEMPERATURE_CEILING)
        };

        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if let Some(prompt) = &self.settings.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(conversation.messages.iter().cloned());

        ProviderRequest {
            model: self.settings.model.clone(),
            messages,
            temperature,
            max_tokens: self.settings.max_tokens,
            tools,
            stream,
        }
    }

    fn timed_out(&self) -> ProviderError {
        ProviderError::Timeout(format!("model call exceeded {:?}", self.settings.timeout))
    }

    /// Batch mode: one request, one assembled assistant message.
    pub async fn invoke(&self, conversation: &Conversation) -> Result<ModelReply, ProviderError> {
        let request = self.build_request(conversation, false);
        debug!(provider = self.provider.name(), messages = request.messages.len(), "Invoking model");

        let response = tokio::time::timeout(self.settings.timeout, self.provider.complete(request))
            .await
            .map_err(|_| self.timed_out())??;

        Ok(ModelReply {
            message: into_assistant(response.message),
            usage: response.usage,
        })
    }

    /// Streaming mode: text fragments go to `sink` as they arrive.
    ///
    /// Text is a `Chunk` until the turn signals tool use, a `Thought` after.
    /// Tool-call arguments never reach the sink.
    pub async fn invoke_streaming(
        &self,
        conversation: &Conversation,
        sink: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<ModelReply, ProviderError> {
        let request = self.build_request(conversation, true);
        debug!(provider = self.provider.name(), messages = request.messages.len(), "Invoking model (streaming)");

        let mut clock = ProviderClock::new(self.settings.timeout);
        let mut rx = clock
            .wait(self.provider.stream(request))
            .await
            .ok_or_else(|| self.timed_out())??;

        let mut content = String::new();
        let mut tool_calls: Vec<MessageToolCall> = Vec::new();
        let mut tool_use = false;
        let mut usage = None;

        loop {
            let Some(chunk) = clock.wait(rx.recv()).await.ok_or_else(|| self.timed_out())? else {
                warn!(provider = self.provider.name(), "Provider stream closed before its final chunk");
                return Err(ProviderError::StreamInterrupted(
                    "stream closed before completion".into(),
                ));
            };
            let chunk = chunk?;

            tool_use |= chunk.tool_use || !chunk.tool_calls.is_empty();

            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                content.push_str(&text);
                let event = if tool_use {
                    AgentStreamEvent::Thought { content: text }
                } else {
                    AgentStreamEvent::Chunk { content: text }
                };
                // A closed sink means the consumer left; the driver cancels us.
                let _ = sink.send(event).await;
            }

            tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }

            if chunk.done {
                break;
            }
        }

        Ok(ModelReply {
            message: Message::assistant_with_tools(content, tool_calls),
            usage,
        })
    }
}

/// Time the provider has left in one streaming turn.
///
/// Only waits on the provider are charged. Back-pressure from the event
/// sink is not.
struct ProviderClock {
    remaining: Duration,
}

impl ProviderClock {
    fn new(timeout: Duration) -> Self {
        Self { remaining: timeout }
    }

    async fn wait<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        let started = tokio::time::Instant::now();
        let out = tokio::time::timeout(self.remaining, fut).await.ok();
        self.remaining = self.remaining.saturating_sub(started.elapsed());
        out
    }
}

/// Providers may return any role; the loop only ever appends assistant turns.
fn into_assistant(mut message: Message) -> Message {
    message.role = finchat_core::message::Role::Assistant;
    message.tool_call_id = None;
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ChunkScriptProvider, SequentialMockProvider, SleepyProvider, make_tool_call};
    use finchat_core::message::Role;
    use finchat_core::provider::StreamChunk;

    fn conversation() -> Conversation {
        Conversation::from_messages(vec![Message::user("What is the latest news about NVIDIA?")])
    }

    fn search_registry() -> Arc<ToolRegistry> {
        Arc::new(finchat_tools::default_registry())
    }

    fn settings() -> ModelSettings {
        ModelSettings {
            temperature: 0.9,
            system_prompt: Some("You are a financial assistant.".into()),
            ..ModelSettings::new("mock-model")
        }
    }

    #[tokio::test]
    async fn request_carries_prompt_tools_and_clamped_temperature() {
        let provider = Arc::new(SequentialMockProvider::single_text("hi"));
        let invoker = ModelInvoker::new(provider.clone(), search_registry(), settings());

        let conv = conversation();
        invoker.invoke(&conv).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].name, "duckduckgo_search");
        assert!(request.temperature <= ROUTING_TEMPERATURE_CEILING);

        // The transcript itself is untouched
        assert_eq!(conv.len(), 1);
    }

    #[tokio::test]
    async fn temperature_is_kept_without_tools() {
        let provider = Arc::new(SequentialMockProvider::single_text("hi"));
        let invoker = ModelInvoker::new(provider.clone(), Arc::new(ToolRegistry::new()), settings());
        invoker.invoke(&conversation()).await.unwrap();
        assert_eq!(provider.requests()[0].temperature, 0.9);
    }

    #[tokio::test]
    async fn batch_reply_carries_tool_calls() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("duckduckgo_search", serde_json::json!({"query": "NVIDIA"}))],
            "",
            "done",
        ));
        let invoker = ModelInvoker::new(provider, search_registry(), settings());
        let reply = invoker.invoke(&conversation()).await.unwrap();
        assert!(reply.message.requests_tools());
        assert_eq!(reply.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let provider = Arc::new(SleepyProvider::new(Duration::from_secs(120)));
        let invoker = ModelInvoker::new(
            provider,
            search_registry(),
            ModelSettings {
                timeout: Duration::from_secs(5),
                ..settings()
            },
        );
        let err = invoker.invoke(&conversation()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn streaming_final_turn_emits_chunks() {
        let provider = Arc::new(ChunkScriptProvider::new(vec![vec![
            StreamChunk {
                content: Some("NVIDIA ".into()),
                ..StreamChunk::default()
            },
            StreamChunk {
                content: Some("is up.".into()),
                done: true,
                ..StreamChunk::default()
            },
        ]]));
        let invoker = ModelInvoker::new(provider, search_registry(), settings());

        let (tx, mut rx) = mpsc::channel(8);
        let reply = invoker.invoke_streaming(&conversation(), &tx).await.unwrap();
        drop(tx);

        assert_eq!(reply.message.content, "NVIDIA is up.");
        assert!(!reply.message.requests_tools());
        assert_eq!(rx.recv().await, Some(AgentStreamEvent::Chunk { content: "NVIDIA ".into() }));
        assert_eq!(rx.recv().await, Some(AgentStreamEvent::Chunk { content: "is up.".into() }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn streaming_text_after_tool_signal_is_a_thought() {
        let provider = Arc::new(ChunkScriptProvider::new(vec![vec![
            StreamChunk {
                tool_use: true,
                ..StreamChunk::default()
            },
            StreamChunk {
                content: Some("searching".into()),
                tool_use: true,
                ..StreamChunk::default()
            },
            StreamChunk {
                tool_calls: vec![make_tool_call("duckduckgo_search", serde_json::json!({"query": "NVDA"}))],
                tool_use: true,
                done: true,
                ..StreamChunk::default()
            },
        ]]));
        let invoker = ModelInvoker::new(provider, search_registry(), settings());

        let (tx, mut rx) = mpsc::channel(8);
        let reply = invoker.invoke_streaming(&conversation(), &tx).await.unwrap();
        drop(tx);

        assert!(reply.message.requests_tools());
        assert_eq!(rx.recv().await, Some(AgentStreamEvent::Thought { content: "searching".into() }));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_does_not_count_against_model_timeout() {
        let turn = (0..4)
            .map(|i| StreamChunk {
                content: Some(format!("part{i} ")),
                done: i == 3,
                ..StreamChunk::default()
            })
            .collect();
        let provider = Arc::new(ChunkScriptProvider::new(vec![turn]));
        let invoker = ModelInvoker::new(
            provider,
            search_registry(),
            ModelSettings {
                timeout: Duration::from_secs(1),
                ..settings()
            },
        );

        let (tx, mut rx) = mpsc::channel(1);
        let consumer = tokio::spawn(async move {
            let mut received = 0;
            loop {
                tokio::time::sleep(Duration::from_secs(2)).await;
                if rx.recv().await.is_none() {
                    break;
                }
                received += 1;
            }
            received
        });

        let reply = invoker.invoke_streaming(&conversation(), &tx).await.unwrap();
        drop(tx);

        assert_eq!(reply.message.content, "part0 part1 part2 part3 ");
        assert_eq!(consumer.await.unwrap(), 4);
    }

    #[tokio::test]
    async fn streaming_error_chunk_fails_the_turn() {
        let provider = Arc::new(ChunkScriptProvider::failing(ProviderError::StreamInterrupted("reset".into())));
        let invoker = ModelInvoker::new(provider, search_registry(), settings());
        let (tx, _rx) = mpsc::channel(8);
        let err = invoker.invoke_streaming(&conversation(), &tx).await.unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }
}
