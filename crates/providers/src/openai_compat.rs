//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any endpoint exposing `/v1/chat/completions`
//! (Azure proxies, vLLM, Ollama, ...).
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling

use async_trait::async_trait;
use finchat_config::AppConfig;
use finchat_core::error::ProviderError;
use finchat_core::message::{Message, MessageToolCall};
use finchat_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build the provider described by `[model]` and the configured API key.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            ProviderError::NotConfigured("no API key; set FINCHAT_API_KEY or OPENAI_API_KEY".into())
        })?;
        Self::new("openai", &config.model.base_url, api_key)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: match &tc.arguments {
                                        serde_json::Value::String(raw) => raw.clone(),
                                        other => other.to_string(),
                                    },
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    async fn post(&self, body: &serde_json::Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            builder = builder.header("Accept", "text/event-stream");
        }

        let response = builder.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl finchat_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::request_body(&request, false);
        debug!(provider = %self.name, model = %request.model, tools = request.tools.len(), "Sending completion request");

        let response = self.post(&body, false).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("failed to parse response: {e}")))?;

        parse_completion(api_response)
    }

    async fn stream(&self, request: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
        let body = Self::request_body(&request, true);
        debug!(provider = %self.name, model = %request.model, tools = request.tools.len(), "Sending streaming request");

        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut assembler = StreamAssembler::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    match assembler.feed_line(&line) {
                        Ok(Some(chunk)) => {
                            let done = chunk.done;
                            if tx.send(Ok(chunk)).await.is_err() || done {
                                return; // receiver dropped, or stream complete
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            trace!(provider = %provider_name, line = %line, error = %e, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(assembler.finish())).await;
        });

        Ok(rx)
    }
}

fn parse_completion(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".into()))?;

    let tool_calls: Vec<MessageToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| MessageToolCall::from_raw_arguments(tc.id, tc.function.name, &tc.function.arguments))
        .collect();

    let message = Message::assistant_with_tools(choice.message.content.unwrap_or_default(), tool_calls);

    Ok(ProviderResponse {
        message,
        usage: api_response.usage.map(Usage::from),
        model: api_response.model,
    })
}

// --- Streaming assembly ---

/// Splits the SSE byte stream into lines.
///
/// Bytes are decoded only once a whole line is buffered, so a multibyte
/// character split across two reads survives intact.
#[derive(Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).trim_end_matches('\r').to_string())
    }
}

/// Turns SSE `data:` lines into [`StreamChunk`]s.
///
/// Tool-call fragments are accumulated by index and only released on the
/// final chunk. The first fragment flips `tool_use` for the rest of the turn.
/// Usage may ride on any chunk; it is kept and reported on the final one.
#[derive(Default)]
struct StreamAssembler {
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    tool_use: bool,
    usage: Option<Usage>,
}

impl StreamAssembler {
    fn feed_line(&mut self, line: &str) -> Result<Option<StreamChunk>, serde_json::Error> {
        // Skip empty lines, SSE comments and non-data fields
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Ok(Some(self.finish()));
        }

        let stream_resp: StreamResponse = serde_json::from_str(data)?;

        if let Some(usage) = stream_resp.usage {
            self.usage = Some(usage.into());
        }

        let Some(choice) = stream_resp.choices.into_iter().next() else {
            // A usage-only chunk closes the turn
            return Ok(self.usage.is_some().then(|| self.finish()));
        };

        let newly_signalled = match choice.delta.tool_calls {
            Some(deltas) if !deltas.is_empty() => {
                for delta in deltas {
                    let acc = self.tool_calls.entry(delta.index).or_default();
                    if let Some(id) = delta.id {
                        acc.id = id;
                    }
                    if let Some(func) = delta.function {
                        if let Some(name) = func.name {
                            acc.name = name;
                        }
                        if let Some(args) = func.arguments {
                            acc.arguments.push_str(&args);
                        }
                    }
                }
                !std::mem::replace(&mut self.tool_use, true)
            }
            _ => false,
        };

        let content = choice.delta.content.filter(|c| !c.is_empty());
        if content.is_none() && !newly_signalled {
            return Ok(None);
        }

        Ok(Some(StreamChunk {
            content,
            tool_use: self.tool_use,
            ..StreamChunk::default()
        }))
    }

    /// The final chunk, carrying every assembled tool call in index order.
    fn finish(&mut self) -> StreamChunk {
        let tool_calls: Vec<MessageToolCall> = std::mem::take(&mut self.tool_calls)
            .into_iter()
            .map(|(index, acc)| acc.to_tool_call(index))
            .collect();
        StreamChunk {
            content: None,
            tool_use: self.tool_use || !tool_calls.is_empty(),
            tool_calls,
            done: true,
            usage: self.usage.take(),
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta. Arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    /// Servers that omit ids still need distinct ones for tool results to link.
    fn to_tool_call(&self, index: u32) -> MessageToolCall {
        let id = if self.id.is_empty() {
            format!("call_{index}")
        } else {
            self.id.clone()
        };
        MessageToolCall::from_raw_arguments(id, self.name.clone(), &self.arguments)
    }
}
