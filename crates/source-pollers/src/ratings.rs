use crate::retry::with_retry;
use anyhow::Result;
use fact_store::FactStore;
use intel_core::RatingsProvider;
use std::sync::Arc;
use std::time::Duration;

const FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Appends the latest analyst consensus recommendation per tracked ticker.
pub struct RatingsPoller {
    provider: Arc<dyn RatingsProvider>,
    store: FactStore,
    tickers: Vec<String>,
}

impl RatingsPoller {
    pub fn new(provider: Arc<dyn RatingsProvider>, store: FactStore, tickers: Vec<String>) -> Self {
        Self {
            provider,
            store,
            tickers,
        }
    }

    /// One pass over every tracked ticker. Returns the number of ratings
    /// recorded.
    pub async fn poll(&self) -> Result<u64> {
        let mut recorded = 0u64;

        for ticker in &self.tickers {
            let rating = match with_retry(ticker, FETCH_ATTEMPTS, RETRY_BASE_DELAY, || {
                self.provider.consensus_rating(ticker)
            })
            .await
            {
                Ok(rating) => rating,
                Err(e) => {
                    tracing::warn!("{}: skipping rating this pass: {}", ticker, e);
                    continue;
                }
            };

            let Some(recommendation) = rating else {
                tracing::warn!("{}: consensus rating not found", ticker);
                continue;
            };

            self.store.insert_rating(ticker, &recommendation).await?;
            recorded += 1;
            tracing::info!("{}: saved consensus rating {:?}", ticker, recommendation);
        }

        Ok(recorded)
    }
}
