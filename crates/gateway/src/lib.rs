//! HTTP API gateway for finchat.
//!
//! Exposes the chat agent (batch and SSE), the tool list, market history
//! and company news analysis. Built on Axum.

pub mod api;
pub mod market_routes;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{Router, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use finchat_agent::{AgentLoop, StreamPolicy};
use finchat_config::{AppConfig, GatewayConfig};
use finchat_core::error::ProviderError;
use finchat_core::provider::Provider;
use finchat_market::{FinnhubNews, MarketData, MarketError, NewsSource, Range, YahooMarketData};
use finchat_providers::OpenAiCompatProvider;

/// Shared, read-only state for every request.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,
    pub market: Arc<dyn MarketData>,
    /// `None` when no news credential is configured.
    pub news: Option<Arc<dyn NewsSource>>,
    pub stream_policy: StreamPolicy,
    pub default_range: Range,
    pub news_lookback_days: u32,
}

pub type SharedState = Arc<GatewayState>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayState {
    /// Build the provider, tools, agent and market clients once.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(config)?);
        let tools = Arc::new(finchat_tools::default_registry());
        let agent = Arc::new(AgentLoop::from_config(provider, tools, config));

        let news: Option<Arc<dyn NewsSource>> = match FinnhubNews::from_config(&config.market) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "Company news disabled");
                None
            }
        };

        Ok(Self {
            agent,
            market: Arc::new(YahooMarketData::new()?),
            news,
            stream_policy: StreamPolicy {
                expose_agent_events: config.gateway.expose_agent_events,
            },
            default_range: config.market.default_range.parse()?,
            news_lookback_days: config.market.news_lookback_days,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Build the router with all gateway routes.
///
/// Layers: 1 MB body limit, CORS from `gateway.allowed_origins`, HTTP trace logging.
pub fn build_router(state: SharedState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(api::api_router())
        .merge(market_routes::market_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // Credentialed CORS forbids the wildcard origin.
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), StartupError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let state = Arc::new(GatewayState::from_config(&config)?);
    let app = build_router(state, &config.gateway);

    info!(addr = %addr, model = %config.model.name, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
