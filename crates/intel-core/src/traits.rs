use crate::{FeedItem, FilingRef, IntelError, PriceObservation, StatementBundle};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Market-data provider: daily prices and quarterly statement bundles
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn daily_prices(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceObservation>, IntelError>;

    async fn quarterly_financials(
        &self,
        ticker: &str,
        limit: u32,
    ) -> Result<Vec<StatementBundle>, IntelError>;
}

/// Filing-index provider plus raw document download
#[async_trait]
pub trait FilingProvider: Send + Sync {
    async fn filing_index(&self, ticker: &str, limit: u32) -> Result<Vec<FilingRef>, IntelError>;

    /// Fetch the raw filing page body for primary-text extraction
    async fn fetch_document(&self, url: &str) -> Result<String, IntelError>;
}

/// Analyst consensus provider
#[async_trait]
pub trait RatingsProvider: Send + Sync {
    /// Latest consensus recommendation, None when the provider has no coverage
    async fn consensus_rating(&self, ticker: &str) -> Result<Option<String>, IntelError>;
}

/// Syndication feed fetcher
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<Vec<FeedItem>, IntelError>;
}

/// The external generative-text model: prompt in, prose out.
/// Treated as an untrusted, possibly slow, possibly wrong black box.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, IntelError>;
}
