//! Company news from Finnhub, plus the fixed sample headlines.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use finchat_config::MarketConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MarketError, Result};

const FINNHUB_URL: &str = "https://finnhub.io/api/v1";

/// A news item about one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsRecord {
    pub headline: String,
    pub summary: String,
    pub url: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// News published for `symbol` between `from` and `to`, inclusive.
    async fn company_news(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<NewsRecord>>;
}

pub struct FinnhubNews {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FinnhubNews {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, FINNHUB_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        config
            .finnhub_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .map(Self::new)
            .ok_or_else(|| MarketError::NotConfigured("FINNHUB_API_KEY is not set".into()))
    }
}

#[async_trait]
impl NewsSource for FinnhubNews {
    async fn company_news(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<NewsRecord>> {
        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        debug!(symbol, %from, %to, "Fetching company news");

        let response = self
            .client
            .get(format!("{}/company-news", self.base_url))
            .query(&[
                ("symbol", symbol),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketError::upstream("finnhub", e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketError::upstream("finnhub", e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(MarketError::upstream("finnhub", format!("status {status}: {body}")));
        }

        parse_company_news(&body)
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

/// Parse a `company-news` body. Items without a headline or time are skipped.
pub fn parse_company_news(body: &str) -> Result<Vec<NewsRecord>> {
    let articles: Vec<FinnhubArticle> =
        serde_json::from_str(body).map_err(|e| MarketError::malformed("finnhub", e.to_string()))?;

    Ok(articles
        .into_iter()
        .filter(|a| !a.headline.trim().is_empty() && a.datetime > 0)
        .filter_map(|a| {
            Some(NewsRecord {
                published_at: DateTime::from_timestamp(a.datetime, 0)?,
                headline: a.headline,
                summary: a.summary,
                url: a.url,
                source: a.source,
            })
        })
        .collect())
}

/// A headline served without any upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleHeadline {
    pub id: u32,
    pub title: String,
    pub source: String,
}

pub fn sample_headlines() -> Vec<SampleHeadline> {
    [
        (1, "Big Tech Stocks Rally on Positive Earnings", "TechCrunch"),
        (2, "Market Volatility Increases Amidst Economic Uncertainty", "Reuters"),
        (3, "New Innovations in Green Energy Boost Sector Stocks", "Bloomberg"),
    ]
    .into_iter()
    .map(|(id, title, source)| SampleHeadline {
        id,
        title: title.into(),
        source: source.into(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_company_news() {
        let body = r#"[
            {
                "category": "company",
                "datetime": 1700000000,
                "headline": "NVIDIA beats estimates",
                "id": 42,
                "image": "",
                "related": "NVDA",
                "source": "Reuters",
                "summary": "Data center revenue tripled.",
                "url": "https://example.com/nvda"
            },
            { "datetime": 1700000100, "headline": "  ", "source": "Blog" },
            { "datetime": 0, "headline": "Undated", "source": "Blog" }
        ]"#;

        let news = parse_company_news(body).unwrap();
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].headline, "NVIDIA beats estimates");
        assert_eq!(news[0].source, "Reuters");
        assert_eq!(news[0].published_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn error_object_is_malformed() {
        let err = parse_company_news(r#"{"error": "Invalid API key"}"#).unwrap_err();
        assert!(matches!(err, MarketError::Malformed { .. }));
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = MarketConfig {
            finnhub_api_key: None,
            ..MarketConfig::default()
        };
        assert!(matches!(
            FinnhubNews::from_config(&config),
            Err(MarketError::NotConfigured(_))
        ));

        let config = MarketConfig {
            finnhub_api_key: Some("  ".into()),
            ..MarketConfig::default()
        };
        assert!(FinnhubNews::from_config(&config).is_err());

        let config = MarketConfig {
            finnhub_api_key: Some("fh-key".into()),
            ..MarketConfig::default()
        };
        assert!(FinnhubNews::from_config(&config).is_ok());
    }

    #[test]
    fn sample_headlines_are_fixed() {
        let items = sample_headlines();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Big Tech Stocks Rally on Positive Earnings");
        assert_eq!(items[2].source, "Bloomberg");
        let ids: Vec<_> = items.iter().map(|h| h.id).collect();
        assert_eq!(ids, [1, 2, 3]);
    }
}
