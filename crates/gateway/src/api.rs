//! Chat and tool endpoints.
//!
//! - `POST /api/chat`: run the agent, return the transcript and answer
//! - `POST /api/chat/stream`: run the agent, stream SSE events
//! - `GET  /api/tools`: list available tools

use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use finchat_agent::EventStreamAdapter;
use finchat_core::error::Error;
use finchat_core::message::{Conversation, Message};
use finchat_core::provider::Usage;

use crate::{ApiError, SharedState, api_error};

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/tools", get(list_tools_handler))
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub conversation_id: String,
    pub messages: Vec<MessageDto>,
    pub answer: String,
    pub round_trips: u32,
    pub tool_calls: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageDto {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolCallDto {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl From<&Message> for MessageDto {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role.as_str().into(),
            content: m.content.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|c| ToolCallDto {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                })
                .collect(),
            tool_call_id: m.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolDto {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Turn the request history into a fresh conversation.
///
/// Only `user` and `assistant` turns are accepted from clients.
fn to_conversation(request: ChatRequest) -> Result<Conversation, ApiError> {
    if request.messages.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "messages must not be empty"));
    }

    let mut conversation = Conversation::new();
    for (index, incoming) in request.messages.into_iter().enumerate() {
        let message = match incoming.role.trim().to_ascii_lowercase().as_str() {
            "user" => Message::user(incoming.content),
            "assistant" => Message::assistant(incoming.content),
            other => {
                return Err(api_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("messages[{index}]: unsupported role '{other}', expected 'user' or 'assistant'"),
                ));
            }
        };
        conversation.push(message);
    }
    Ok(conversation)
}

fn agent_error(e: &Error) -> ApiError {
    let status = match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Provider(_) | Error::RoundTripLimitExceeded { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status != StatusCode::BAD_REQUEST {
        warn!(error = %e, status = status.as_u16(), "Chat request failed");
    }
    api_error(status, e.to_string())
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let conversation = to_conversation(payload)?;
    info!(conversation_id = %conversation.id, messages = conversation.len(), "api/chat request");

    let outcome = state.agent.run(conversation).await.map_err(|e| agent_error(&e))?;

    Ok(Json(ChatResponse {
        conversation_id: outcome.conversation.id.to_string(),
        messages: outcome.conversation.messages.iter().map(MessageDto::from).collect(),
        answer: outcome.answer,
        round_trips: outcome.round_trips,
        tool_calls: outcome.tool_calls_made,
        usage: outcome.usage,
    }))
}

/// `POST /api/chat/stream`: SSE events, ending with one `done` or `error`.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let conversation = to_conversation(payload)?;
    info!(conversation_id = %conversation.id, messages = conversation.len(), "api/chat/stream SSE request");

    let rx = state.agent.run_stream(conversation).map_err(|e| agent_error(&e))?;

    let stream = EventStreamAdapter::new(rx, state.stream_policy).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let defs = state.agent.tools().definitions();
    let count = defs.len();

    Json(ToolListResponse {
        tools: defs
            .into_iter()
            .map(|d| ToolDto {
                name: d.name,
                description: d.description,
                parameters: d.parameters,
            })
            .collect(),
        count,
    })
}
