//! Test doubles for gateway routes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use finchat_agent::{AgentLoop, ModelSettings, StreamPolicy};
use finchat_config::GatewayConfig;
use finchat_core::error::{ProviderError, ToolError};
use finchat_core::message::{Message, MessageToolCall};
use finchat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use finchat_core::tool::{Tool, ToolRegistry, ToolResult};
use finchat_market::{MarketData, MarketError, NewsRecord, NewsSource, OhlcvRow, Range};

use crate::{GatewayState, SharedState, build_router};

/// Replays scripted replies, then fails.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }

    pub fn text(answer: &str) -> Self {
        Self::new(vec![Ok(text_response(answer))])
    }

    pub fn search_then(answer: &str) -> Self {
        Self::new(vec![
            Ok(ProviderResponse {
                message: Message::assistant_with_tools(
                    "",
                    vec![MessageToolCall::new(
                        "call_1",
                        "duckduckgo_search",
                        serde_json::json!({"query": "NVIDIA news"}),
                    )],
                ),
                usage: usage(),
                model: "mock-model".into(),
            }),
            Ok(text_response(answer)),
        ])
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(vec![Err(error)])
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "gateway_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::ApiError {
                status_code: 500,
                message: "script exhausted".into(),
            }))
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

fn text_response(answer: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(answer),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// `duckduckgo_search` answered from memory.
pub struct OfflineSearch;

#[async_trait]
impl Tool for OfflineSearch {
    fn name(&self) -> &str {
        "duckduckgo_search"
    }

    fn description(&self) -> &str {
        "Offline search"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok("NVIDIA shares rose 3% on record revenue."))
    }
}

#[derive(Default)]
pub struct FixedMarket {
    pub rows: Vec<OhlcvRow>,
    pub fail: bool,
}

#[async_trait]
impl MarketData for FixedMarket {
    async fn history(&self, _symbol: &str, _range: Range) -> finchat_market::Result<Vec<OhlcvRow>> {
        if self.fail {
            return Err(MarketError::Upstream {
                service: "yahoo".into(),
                message: "status 500".into(),
            });
        }
        Ok(self.rows.clone())
    }
}

pub struct FixedNews {
    pub records: Vec<NewsRecord>,
    pub fail: bool,
}

#[async_trait]
impl NewsSource for FixedNews {
    async fn company_news(&self, _symbol: &str, _from: NaiveDate, _to: NaiveDate) -> finchat_market::Result<Vec<NewsRecord>> {
        if self.fail {
            return Err(MarketError::Upstream {
                service: "finnhub".into(),
                message: "status 429".into(),
            });
        }
        Ok(self.records.clone())
    }
}

pub fn bar(ts: i64, close: f64) -> OhlcvRow {
    OhlcvRow {
        timestamp: DateTime::from_timestamp(ts, 0).unwrap(),
        open: close,
        high: close,
        low: close,
        close,
        adj_close: close,
        volume: 1_000,
    }
}

pub fn news_record(headline: &str, ts: i64) -> NewsRecord {
    NewsRecord {
        headline: headline.into(),
        summary: "summary".into(),
        url: "https://example.com/a".into(),
        source: "Reuters".into(),
        published_at: DateTime::<Utc>::from_timestamp(ts, 0).unwrap(),
    }
}

pub fn offline_tools() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(OfflineSearch));
    Arc::new(registry)
}

pub fn state_with(provider: ScriptedProvider, market: FixedMarket, news: Option<FixedNews>) -> GatewayState {
    GatewayState {
        agent: Arc::new(AgentLoop::new(
            Arc::new(provider),
            offline_tools(),
            ModelSettings::new("mock-model"),
        )),
        market: Arc::new(market),
        news: news.map(|n| Arc::new(n) as Arc<dyn NewsSource>),
        stream_policy: StreamPolicy::default(),
        default_range: Range::OneMonth,
        news_lookback_days: 7,
    }
}

pub fn test_state() -> SharedState {
    Arc::new(state_with(
        ScriptedProvider::text("Mock response from agent"),
        FixedMarket::default(),
        None,
    ))
}

pub fn app(state: SharedState) -> Router {
    build_router(state, &GatewayConfig::default())
}
