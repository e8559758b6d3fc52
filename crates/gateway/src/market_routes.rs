//! Market history and news endpoints.
//!
//! - `GET /api/market/{symbol}?range=1mo`: normalized OHLCV rows
//! - `GET /api/news`: sample headlines
//! - `GET /api/news/{symbol}?range=1mo`: company news with price impact

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use finchat_market::{
    MarketError, NewsAnalysis, OhlcvRow, Range, SampleHeadline, company_news_impact, sample_headlines,
    validate_symbol,
};

use crate::{ApiError, SharedState, api_error};

pub fn market_router() -> Router<SharedState> {
    Router::new()
        .route("/api/market/{symbol}", get(market_history_handler))
        .route("/api/news", get(sample_news_handler))
        .route("/api/news/{symbol}", get(company_news_handler))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarketHistoryResponse {
    pub symbol: String,
    pub range: Range,
    pub rows: Vec<OhlcvRow>,
}

#[derive(Debug, Serialize)]
pub struct SampleNewsResponse {
    pub news: Vec<SampleHeadline>,
}

fn market_error(e: MarketError) -> ApiError {
    let status = match &e {
        MarketError::InvalidSymbol(_) | MarketError::InvalidRange(_) => StatusCode::BAD_REQUEST,
        MarketError::Upstream { .. } | MarketError::Malformed { .. } => StatusCode::BAD_GATEWAY,
        MarketError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status != StatusCode::BAD_REQUEST {
        warn!(error = %e, status = status.as_u16(), "Market request failed");
    }
    api_error(status, e.to_string())
}

fn resolve(symbol: &str, query: &RangeQuery, default_range: Range) -> Result<(String, Range), ApiError> {
    let symbol = validate_symbol(symbol).map_err(market_error)?;
    let range = match query.range.as_deref() {
        Some(raw) => raw.parse().map_err(market_error)?,
        None => default_range,
    };
    Ok((symbol, range))
}

async fn market_history_handler(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<MarketHistoryResponse>, ApiError> {
    let (symbol, range) = resolve(&symbol, &query, state.default_range)?;
    info!(%symbol, %range, "api/market request");

    let rows = state.market.history(&symbol, range).await.map_err(market_error)?;
    Ok(Json(MarketHistoryResponse { symbol, range, rows }))
}

async fn sample_news_handler() -> Json<SampleNewsResponse> {
    Json(SampleNewsResponse {
        news: sample_headlines(),
    })
}

async fn company_news_handler(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<NewsAnalysis>, ApiError> {
    let (symbol, range) = resolve(&symbol, &query, state.default_range)?;
    let news = state
        .news
        .as_ref()
        .ok_or_else(|| market_error(MarketError::NotConfigured("company news needs FINNHUB_API_KEY".into())))?;
    info!(%symbol, %range, "api/news request");

    let analysis = company_news_impact(
        state.market.as_ref(),
        news.as_ref(),
        &symbol,
        range,
        state.news_lookback_days,
        Utc::now(),
    )
    .await
    .map_err(market_error)?;

    Ok(Json(analysis))
}
