use crate::retry::with_retry;
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use fact_store::FactStore;
use intel_core::MarketDataProvider;
use std::sync::Arc;
use std::time::Duration;

const FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Fetches daily OHLC + P/E observations per tracked ticker and upserts them.
/// The same poller serves the routine pass (short lookback) and backfill
/// (multi-year lookback); idempotent upserts make rerunning safe.
pub struct PricePoller {
    provider: Arc<dyn MarketDataProvider>,
    store: FactStore,
    tickers: Vec<String>,
}

impl PricePoller {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: FactStore,
        tickers: Vec<String>,
    ) -> Self {
        Self {
            provider,
            store,
            tickers,
        }
    }

    /// One pass over every tracked ticker. Returns the number of
    /// observations written.
    pub async fn poll(&self, lookback_days: i64) -> Result<u64> {
        let to = Utc::now().date_naive();
        let from = to - ChronoDuration::days(lookback_days);
        let mut written = 0u64;

        for ticker in &self.tickers {
            let observations = match with_retry(ticker, FETCH_ATTEMPTS, RETRY_BASE_DELAY, || {
                self.provider.daily_prices(ticker, from, to)
            })
            .await
            {
                Ok(obs) => obs,
                Err(e) => {
                    tracing::warn!("{}: skipping price update this pass: {}", ticker, e);
                    continue;
                }
            };

            if observations.is_empty() {
                tracing::warn!("{}: no price data returned", ticker);
                continue;
            }

            for obs in &observations {
                self.store.upsert_price(obs).await?;
                written += 1;
            }
            tracing::info!("{}: upserted {} price observations", ticker, observations.len());
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use intel_core::{IntelError, PriceObservation, StatementBundle};

    struct StubMarketData {
        observations: Vec<PriceObservation>,
    }

    #[async_trait]
    impl MarketDataProvider for StubMarketData {
        async fn daily_prices(
            &self,
            _ticker: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<PriceObservation>, IntelError> {
            Ok(self.observations.clone())
        }

        async fn quarterly_financials(
            &self,
            _ticker: &str,
            _limit: u32,
        ) -> Result<Vec<StatementBundle>, IntelError> {
            Ok(Vec::new())
        }
    }

    async fn setup_store() -> FactStore {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let store = FactStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    fn observation(date: &str, close: f64) -> PriceObservation {
        PriceObservation {
            ticker: "ACME".to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000_000,
            pe: Some(18.0),
        }
    }

    #[tokio::test]
    async fn repeated_passes_never_duplicate_rows() {
        let store = setup_store().await;
        let poller = PricePoller::new(
            Arc::new(StubMarketData {
                observations: vec![observation("2024-01-02", 50.0), observation("2024-01-03", 51.0)],
            }),
            store.clone(),
            vec!["ACME".to_string()],
        );

        assert_eq!(poller.poll(14).await.unwrap(), 2);
        assert_eq!(poller.poll(14).await.unwrap(), 2);

        let prices = store.recent_prices("ACME", 10).await.unwrap();
        assert_eq!(prices.len(), 2);
    }
}
