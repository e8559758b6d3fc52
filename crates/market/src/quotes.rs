//! Price history from the Yahoo Finance chart API.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{MarketError, Result};

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = concat!("finchat/", env!("CARGO_PKG_VERSION"));
const MAX_SYMBOL_LEN: usize = 10;

/// A history window accepted by the chart API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Range {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl Range {
    pub const ALL: [Range; 10] = [
        Range::OneDay,
        Range::FiveDays,
        Range::OneMonth,
        Range::ThreeMonths,
        Range::SixMonths,
        Range::OneYear,
        Range::TwoYears,
        Range::FiveYears,
        Range::YearToDate,
        Range::Max,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }

    /// Bar width requested for this window.
    pub fn interval(&self) -> &'static str {
        match self {
            Self::OneDay => "5m",
            Self::FiveDays => "15m",
            _ => "1d",
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Range {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Range::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MarketError::InvalidRange(s.to_string()))
    }
}

/// Check a ticker symbol and return it uppercased.
///
/// Index (`^GSPC`), class (`BRK.B`) and exchange-suffixed symbols are accepted.
pub fn validate_symbol(symbol: &str) -> Result<String> {
    let trimmed = symbol.trim();
    let valid = !trimmed.is_empty()
        && trimmed.len() <= MAX_SYMBOL_LEN
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));

    if valid {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(MarketError::InvalidSymbol(symbol.to_string()))
    }
}

/// One price bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

/// Source of historical prices.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Bars for `symbol` over `range`, oldest first.
    async fn history(&self, symbol: &str, range: Range) -> Result<Vec<OhlcvRow>>;
}

pub struct YahooMarketData {
    client: reqwest::Client,
    base_url: String,
}

impl YahooMarketData {
    pub fn new() -> Result<Self> {
        Self::with_base_url(YAHOO_CHART_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        // The chart API rejects requests without a user agent.
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MarketError::upstream("yahoo", format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketData for YahooMarketData {
    async fn history(&self, symbol: &str, range: Range) -> Result<Vec<OhlcvRow>> {
        let symbol = validate_symbol(symbol)?;
        let url = format!("{}/{}", self.base_url, symbol);
        debug!(%symbol, %range, interval = range.interval(), "Fetching chart");

        let response = self
            .client
            .get(&url)
            .query(&[("range", range.as_str()), ("interval", range.interval())])
            .send()
            .await
            .map_err(|e| MarketError::upstream("yahoo", e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketError::upstream("yahoo", e.to_string()))?;

        // Unknown symbols come back as 404 with a chart.error body.
        let parsed: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                MarketError::malformed("yahoo", e.to_string())
            } else {
                MarketError::upstream("yahoo", format!("status {status}"))
            }
        })?;

        let rows = normalize_chart(&parsed)?;
        if rows.is_empty() {
            warn!(%symbol, %range, "Chart returned no usable rows");
        }
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
    #[serde(default)]
    adjclose: Vec<AdjCloseColumn>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Default, Deserialize)]
struct AdjCloseColumn {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Turn a chart API body into rows sorted by timestamp.
///
/// Bars missing any of open/high/low/close are dropped, a missing volume is
/// 0 and a missing adjusted close falls back to the close. Columns of
/// different lengths are cut to the shortest OHLC column.
pub fn normalize_chart(body: &serde_json::Value) -> Result<Vec<OhlcvRow>> {
    let envelope =
        ChartEnvelope::deserialize(body).map_err(|e| MarketError::malformed("yahoo", e.to_string()))?;

    if let Some(err) = envelope.chart.error {
        return Err(MarketError::upstream("yahoo", format!("{}: {}", err.code, err.description)));
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|c| c.adjclose)
        .unwrap_or_default();

    let len = [
        result.timestamp.len(),
        quote.open.len(),
        quote.high.len(),
        quote.low.len(),
        quote.close.len(),
    ]
    .into_iter()
    .min()
    .unwrap_or(0);

    let mut rows: Vec<OhlcvRow> = (0..len)
        .filter_map(|i| {
            let timestamp = DateTime::from_timestamp(result.timestamp[i], 0)?;
            let (open, high, low, close) = (quote.open[i]?, quote.high[i]?, quote.low[i]?, quote.close[i]?);
            Some(OhlcvRow {
                timestamp,
                open,
                high,
                low,
                close,
                adj_close: adjclose.get(i).copied().flatten().unwrap_or(close),
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
            })
        })
        .collect();

    rows.sort_by_key(|r| r.timestamp);
    Ok(rows)
}
