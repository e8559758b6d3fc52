//! Shared test doubles for the agent crate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use finchat_core::error::{ProviderError, ToolError};
use finchat_core::message::{Message, MessageToolCall};
use finchat_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
use finchat_core::tool::{Tool, ToolResult};
use tokio::sync::mpsc;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let index = requests.len();

        if index >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                index,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[index].clone())
    }
}

/// Streams scripted chunks, one script per model turn.
pub struct ChunkScriptProvider {
    turns: Mutex<VecDeque<Vec<Result<StreamChunk, ProviderError>>>>,
}

impl ChunkScriptProvider {
    pub fn new(turns: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(|t| t.into_iter().map(Ok).collect()).collect()),
        }
    }

    /// A provider whose only turn fails mid-stream.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            turns: Mutex::new(VecDeque::from([vec![
                Ok(StreamChunk {
                    content: Some("partial".into()),
                    ..StreamChunk::default()
                }),
                Err(error),
            ]])),
        }
    }
}

#[async_trait]
impl Provider for ChunkScriptProvider {
    fn name(&self) -> &str {
        "chunk_script"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("chunk_script only streams".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("ChunkScriptProvider: no more turns");
        let (tx, rx) = mpsc::channel(turn.len().max(1));
        for chunk in turn {
            tx.send(chunk).await.unwrap();
        }
        Ok(rx)
    }
}

/// A provider that takes longer than any sane timeout.
pub struct SleepyProvider {
    delay: Duration,
}

impl SleepyProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Provider for SleepyProvider {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(make_text_response("finally"))
    }
}

/// A provider that requests a search on every turn.
pub struct AlwaysToolsProvider;

#[async_trait]
impl Provider for AlwaysToolsProvider {
    fn name(&self) -> &str {
        "always_tools"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let n = request.messages.len();
        Ok(make_tool_call_response(
            vec![make_tool_call_with_id(
                &format!("call_{n}"),
                "duckduckgo_search",
                serde_json::json!({"query": "more"}),
            )],
            "",
        ))
    }
}

/// A provider whose every call fails.
pub struct FailingProvider(pub ProviderError);

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(self.0.clone())
    }
}

/// A tool that sleeps, then returns a fixed output.
pub struct SleepyTool {
    name: String,
    delay_ms: u64,
    output: String,
}

impl SleepyTool {
    pub fn new(name: &str, delay_ms: u64, output: &str) -> Self {
        Self {
            name: name.into(),
            delay_ms,
            output: output.into(),
        }
    }
}

#[async_trait]
impl Tool for SleepyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps, then answers"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(ToolResult::ok(self.output.clone()))
    }
}

/// A tool that always fails the way a network call would.
pub struct FailingTool {
    name: String,
    reason: String,
}

impl FailingTool {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason: self.reason.clone(),
        })
    }
}

fn mock_usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools(thought, tool_calls),
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    make_tool_call_with_id(&format!("call_{name}"), name, args)
}

pub fn make_tool_call_with_id(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(id, name, args)
}
