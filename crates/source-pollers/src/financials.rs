use crate::retry::with_retry;
use anyhow::Result;
use fact_store::FactStore;
use intel_core::MarketDataProvider;
use std::sync::Arc;
use std::time::Duration;

const FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Ten years of quarters, matching the provider's sensible maximum
const QUARTERS_PER_FETCH: u32 = 40;

/// Fetches quarterly statement bundles per tracked ticker and stores any
/// quarters not yet present.
pub struct FinancialsPoller {
    provider: Arc<dyn MarketDataProvider>,
    store: FactStore,
    tickers: Vec<String>,
}

impl FinancialsPoller {
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

    /// One pass over every tracked ticker. Returns the number of statement
    /// bundles processed.
    pub async fn poll(&self) -> Result<u64> {
        let mut processed = 0u64;

        for ticker in &self.tickers {
            let bundles = match with_retry(ticker, FETCH_ATTEMPTS, RETRY_BASE_DELAY, || {
                self.provider.quarterly_financials(ticker, QUARTERS_PER_FETCH)
            })
            .await
            {
                Ok(bundles) => bundles,
                Err(e) => {
                    tracing::warn!("{}: skipping financials this pass: {}", ticker, e);
                    continue;
                }
            };

            if bundles.is_empty() {
                tracing::warn!("{}: no financial statements returned", ticker);
                continue;
            }

            let count = bundles.len();
            for bundle in &bundles {
                self.store.insert_statements_if_new(bundle).await?;
                processed += 1;
            }
            tracing::info!("{}: processed {} quarters of statements", ticker, count);
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use intel_core::{
        BalanceSheet, CashFlowStatement, IncomeStatement, IntelError, Period, PriceObservation,
        StatementBundle,
    };

    struct StubMarketData {
        bundles: Vec<StatementBundle>,
    }

    #[async_trait]
    impl MarketDataProvider for StubMarketData {
        async fn daily_prices(
            &self,
            _ticker: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<PriceObservation>, IntelError> {
            Ok(Vec::new())
        }

        async fn quarterly_financials(
            &self,
            _ticker: &str,
            _limit: u32,
        ) -> Result<Vec<StatementBundle>, IntelError> {
            Ok(self.bundles.clone())
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

    fn bundle(date: &str) -> StatementBundle {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        StatementBundle {
            income: IncomeStatement {
                ticker: "ACME".to_string(),
                date,
                period: Period::Quarter,
                revenue: Some(12_000_000),
                cost_of_revenue: None,
                gross_profit: None,
                gross_profit_ratio: None,
                net_income: Some(2_000_000),
                eps: None,
            },
            balance: BalanceSheet {
                ticker: "ACME".to_string(),
                date,
                period: Period::Quarter,
                total_assets: None,
                total_liabilities: None,
                total_debt: Some(5_000_000),
                cash_and_equivalents: None,
                total_equity: None,
            },
            cash_flow: CashFlowStatement {
                ticker: "ACME".to_string(),
                date,
                period: Period::Quarter,
                net_cash_from_ops: None,
                net_cash_from_investing: None,
                net_cash_from_financing: None,
                free_cash_flow: Some(2_500_000),
            },
        }
    }

    #[tokio::test]
    async fn repeated_passes_keep_one_row_per_quarter() {
        let store = setup_store().await;
        let poller = FinancialsPoller::new(
            Arc::new(StubMarketData {
                bundles: vec![bundle("2024-03-31"), bundle("2023-12-31")],
            }),
            store.clone(),
            vec!["ACME".to_string()],
        );

        poller.poll().await.unwrap();
        poller.poll().await.unwrap();

        let income = store.recent_quarterly_income("ACME", 8).await.unwrap();
        assert_eq!(income.len(), 2);
        assert_eq!(income[0].date.to_string(), "2024-03-31");
    }
}
