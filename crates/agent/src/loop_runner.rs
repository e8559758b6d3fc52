//! The agent loop driver.
//!
//! Alternates between the model and the tool dispatcher until the model
//! answers without requesting tools, following [`crate::state::transition`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use finchat_config::AppConfig;
use finchat_core::error::Error;
use finchat_core::message::{Conversation, Role};
use finchat_core::provider::{Provider, Usage};
use finchat_core::tool::ToolRegistry;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::dispatch_batch;
use crate::invoker::{ModelInvoker, ModelReply, ModelSettings};
use crate::state::{LoopState, transition};
use crate::stream_event::AgentStreamEvent;

/// The result of a loop that reached `Done`.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Caller's messages followed by everything the loop appended
    pub conversation: Conversation,
    /// Content of the final assistant message
    pub answer: String,
    /// Completed model → tools → model cycles
    pub round_trips: u32,
    pub tool_calls_made: usize,
    /// Summed over every model call that reported usage
    pub usage: Option<Usage>,
    pub state: LoopState,
}

/// The core agent loop that orchestrates LLM calls and tool execution.
#[derive(Clone)]
pub struct AgentLoop {
    invoker: ModelInvoker,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Maximum model ↔ tools round trips per request
    max_round_trips: u32,

    /// Per tool call
    tool_timeout: Duration,

    /// Capacity of the streaming event channel
    stream_buffer: usize,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, settings: ModelSettings) -> Self {
        Self {
            invoker: ModelInvoker::new(provider, tools.clone(), settings),
            tools,
            max_round_trips: 8,
            tool_timeout: Duration::from_secs(20),
            stream_buffer: 32,
        }
    }

    /// Build a loop from `[model]` and `[agent]`.
    pub fn from_config(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        Self::new(provider, tools, ModelSettings::from_config(config))
            .with_max_round_trips(config.agent.max_round_trips)
            .with_tool_timeout(Duration::from_secs(config.agent.tool_timeout_secs))
            .with_stream_buffer(config.agent.stream_buffer)
    }

    /// Set the maximum number of round trips. Values below 1 are raised to 1.
    pub fn with_max_round_trips(mut self, max: u32) -> Self {
        self.max_round_trips = max.max(1);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_stream_buffer(mut self, capacity: usize) -> Self {
        self.stream_buffer = capacity.max(1);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.invoker.settings_mut().system_prompt = Some(prompt.into());
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_round_trips(&self) -> u32 {
        self.max_round_trips
    }

    /// Run the loop in batch mode.
    pub async fn run(&self, conversation: Conversation) -> Result<LoopOutcome, Error> {
        validate(&conversation)?;
        self.drive(conversation, None).await
    }

    /// Run the loop in a background task, streaming events.
    ///
    /// The receiver is bounded, so a slow consumer slows the loop down.
    /// Dropping the receiver cancels the loop, including in-flight tools.
    pub fn run_stream(&self, conversation: Conversation) -> Result<mpsc::Receiver<AgentStreamEvent>, Error> {
        validate(&conversation)?;

        let (tx, rx) = mpsc::channel::<AgentStreamEvent>(self.stream_buffer);
        let agent = self.clone();

        tokio::spawn(async move {
            let conversation_id = conversation.id.clone();
            let result = tokio::select! {
                _ = tx.closed() => {
                    info!(conversation_id = %conversation_id, "Stream consumer went away, cancelling loop");
                    return;
                }
                result = agent.drive(conversation, Some(&tx)) => result,
            };

            let terminal = match result {
                Ok(outcome) => AgentStreamEvent::Done {
                    conversation_id: outcome.conversation.id.to_string(),
                    usage: outcome.usage,
                    round_trips: outcome.round_trips,
                    tool_calls_made: outcome.tool_calls_made,
                },
                Err(e) => AgentStreamEvent::Error { message: e.to_string() },
            };
            let _ = tx.send(terminal).await;
        });

        Ok(rx)
    }

    async fn drive(
        &self,
        mut conversation: Conversation,
        sink: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<LoopOutcome, Error> {
        let started = Instant::now();
        info!(
            conversation_id = %conversation.id,
            messages = conversation.len(),
            streaming = sink.is_some(),
            "Agent loop started"
        );

        let mut state = LoopState::AwaitingModel;
        let mut round_trips = 0u32;
        let mut tool_calls_made = 0usize;
        let mut usage: Option<Usage> = None;

        loop {
            match state {
                LoopState::AwaitingModel => {
                    debug!(conversation_id = %conversation.id, round_trip = round_trips, "Awaiting model");

                    let reply = match sink {
                        Some(tx) => self.invoker.invoke_streaming(&conversation, tx).await,
                        None => self.invoker.invoke(&conversation).await,
                    };
                    let ModelReply { message, usage: turn_usage } = reply.inspect_err(|e| {
                        warn!(conversation_id = %conversation.id, error = %e, "Model invocation failed");
                    })?;
                    usage = add_usage(usage, turn_usage);

                    conversation.push(message);
                    state = transition(state, conversation.last(), round_trips, self.max_round_trips)?;
                }
                LoopState::AwaitingTools => {
                    let calls = conversation
                        .last()
                        .map(|m| m.tool_calls.clone())
                        .unwrap_or_default();

                    if let Some(tx) = sink {
                        for call in &calls {
                            let _ = tx
                                .send(AgentStreamEvent::ToolCall {
                                    id: call.id.clone(),
                                    name: call.name.clone(),
                                    input: call.arguments.clone(),
                                })
                                .await;
                        }
                    }

                    let results = dispatch_batch(&self.tools, &calls, self.tool_timeout).await;
                    tool_calls_made += results.len();

                    for result in results {
                        if let Some(tx) = sink {
                            let _ = tx
                                .send(AgentStreamEvent::ToolResult {
                                    id: result.id.clone(),
                                    name: result.name.clone(),
                                    output: result.message.content.clone(),
                                    success: result.success,
                                })
                                .await;
                        }
                        conversation.push(result.message);
                    }

                    round_trips += 1;
                    state = transition(state, conversation.last(), round_trips, self.max_round_trips)?;
                }
                LoopState::Done => {
                    let answer = conversation.last().map(|m| m.content.clone()).unwrap_or_default();
                    info!(
                        conversation_id = %conversation.id,
                        round_trips,
                        tool_calls_made,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Agent loop done"
                    );
                    return Ok(LoopOutcome {
                        conversation,
                        answer,
                        round_trips,
                        tool_calls_made,
                        usage,
                        state,
                    });
                }
                LoopState::RoundTripLimitReached => {
                    warn!(
                        conversation_id = %conversation.id,
                        limit = self.max_round_trips,
                        "Round-trip limit reached while the model still requests tools"
                    );
                    return Err(Error::RoundTripLimitExceeded {
                        limit: self.max_round_trips,
                    });
                }
            }
        }
    }
}

fn validate(conversation: &Conversation) -> Result<(), Error> {
    if conversation.is_empty() {
        return Err(Error::Validation("conversation must contain at least one message".into()));
    }
    if conversation.messages.iter().all(|m| m.role != Role::User) {
        return Err(Error::Validation("conversation must contain a user message".into()));
    }
    conversation
        .check_tool_links()
        .map_err(|e| Error::Validation(e.to_string()))
}

fn add_usage(total: Option<Usage>, turn: Option<Usage>) -> Option<Usage> {
    match (total, turn) {
        (Some(a), Some(b)) => Some(Usage {
            prompt_tokens: a.prompt_tokens + b.prompt_tokens,
            completion_tokens: a.completion_tokens + b.completion_tokens,
            total_tokens: a.total_tokens + b.total_tokens,
        }),
        (a, b) => a.or(b),
    }
}
