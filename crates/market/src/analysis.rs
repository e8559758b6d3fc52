//! Price movement around news items.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::news::{NewsRecord, NewsSource};
use crate::quotes::{MarketData, OhlcvRow, Range, validate_symbol};

/// A news item with the price move that followed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsArticle {
    pub headline: String,
    pub ticker: String,
    pub url: String,
    pub media_source: String,
    /// Percent change of the first bar at or after publication.
    pub movement: f64,
    pub time_from_now: String,
    pub summary: String,
    pub overall_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsAnalysis {
    pub symbol: String,
    pub overall_change: f64,
    pub articles: Vec<NewsArticle>,
}

/// Place each news item on the price history.
///
/// `history` must be sorted by timestamp. Articles come back newest first.
pub fn analyze_news(symbol: &str, news: &[NewsRecord], history: &[OhlcvRow], now: DateTime<Utc>) -> NewsAnalysis {
    let overall_change = match (history.first(), history.last()) {
        (Some(first), Some(last)) => percent_change(first.close, last.close),
        _ => 0.0,
    };

    let mut ordered: Vec<&NewsRecord> = news.iter().collect();
    ordered.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    let articles = ordered
        .into_iter()
        .map(|record| NewsArticle {
            headline: record.headline.clone(),
            ticker: symbol.to_string(),
            url: record.url.clone(),
            media_source: record.source.clone(),
            movement: movement_after(history, record.published_at),
            time_from_now: time_from_now(record.published_at, now),
            summary: record.summary.clone(),
            overall_change,
        })
        .collect();

    NewsAnalysis {
        symbol: symbol.to_string(),
        overall_change,
        articles,
    }
}

/// Close-to-close change of the first bar at or after `published_at`.
fn movement_after(history: &[OhlcvRow], published_at: DateTime<Utc>) -> f64 {
    let index = history.partition_point(|row| row.timestamp < published_at);
    if index == 0 || index >= history.len() {
        return 0.0;
    }
    percent_change(history[index - 1].close, history[index].close)
}

fn percent_change(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        return 0.0;
    }
    round2((to - from) / from * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `"{n}m ago"`, `"{n}h ago"` or `"{n}d ago"`. Future times read as `0m ago`.
pub fn time_from_now(published_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - published_at).max(Duration::zero());
    if elapsed < Duration::hours(1) {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed < Duration::days(1) {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

/// Fetch history and recent news for `symbol` and analyze them together.
pub async fn company_news_impact(
    market: &dyn MarketData,
    news: &dyn NewsSource,
    symbol: &str,
    range: Range,
    lookback_days: u32,
    now: DateTime<Utc>,
) -> Result<NewsAnalysis> {
    let symbol = validate_symbol(symbol)?;
    let to = now.date_naive();
    let from = to - Duration::days(i64::from(lookback_days));

    let (history, records) = futures::try_join!(
        market.history(&symbol, range),
        news.company_news(&symbol, from, to)
    )?;

    let analysis = analyze_news(&symbol, &records, &history, now);
    info!(
        %symbol,
        %range,
        bars = history.len(),
        articles = analysis.articles.len(),
        overall_change = analysis.overall_change,
        "News impact computed"
    );
    Ok(analysis)
}
