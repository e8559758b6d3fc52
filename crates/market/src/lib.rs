//! Market data for finchat.
//!
//! Price history comes from the Yahoo Finance chart API and company news
//! from Finnhub. Both sit behind traits so the gateway can be tested with
//! fixed data.

pub mod analysis;
pub mod error;
pub mod news;
pub mod quotes;

pub use analysis::{NewsAnalysis, NewsArticle, analyze_news, company_news_impact};
pub use error::{MarketError, Result};
pub use news::{FinnhubNews, NewsRecord, NewsSource, SampleHeadline, sample_headlines};
pub use quotes::{MarketData, OhlcvRow, Range, YahooMarketData, normalize_chart, validate_symbol};
