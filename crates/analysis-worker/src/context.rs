use anyhow::Result;
use fact_store::FactStore;
use intel_core::{ContextSnapshot, FinancialTrends};

/// Valuation sentinel when a ticker has no stored price observations
pub const NO_PRICE_DATA: &str = "No price data available.";

/// One trading year of daily observations
const PRICE_HISTORY_ROWS: i64 = 252;

/// Two years of quarterly statements
const QUARTERS: i64 = 8;

/// Builds the bounded price/financials snapshot joined to one event.
/// Pure read: never mutates the store.
pub struct ContextAssembler {
    store: FactStore,
}

impl ContextAssembler {
    pub fn new(store: FactStore) -> Self {
        Self { store }
    }

    /// Assemble the snapshot for one identifier. Missing data degrades to
    /// sentinels and empty trend lists; only store unavailability errors.
    pub async fn assemble(&self, ticker: &str, primary_text: &str) -> Result<ContextSnapshot> {
        let (prices, income, balance, cash_flow) = tokio::join!(
            self.store.recent_prices(ticker, PRICE_HISTORY_ROWS),
            self.store.recent_quarterly_income(ticker, QUARTERS),
            self.store.recent_quarterly_balance(ticker, QUARTERS),
            self.store.recent_quarterly_cash_flow(ticker, QUARTERS),
        );
        let prices = prices?;
        let income = income?;
        let balance = balance?;
        let cash_flow = cash_flow?;

        let valuation_context = if prices.is_empty() {
            NO_PRICE_DATA.to_string()
        } else {
            let latest = &prices[0];
            // Null and non-positive P/E observations are excluded from the
            // average, not treated as zero
            let valid_pes: Vec<f64> = prices
                .iter()
                .filter_map(|p| p.pe)
                .filter(|pe| *pe > 0.0)
                .collect();

            let mut valuation = format!("The stock closed at ${:.2}", latest.close);
            if let Some(pe) = latest.pe {
                valuation.push_str(&format!(" with a P/E ratio of {:.2}", pe));
            }
            valuation.push('.');
            if !valid_pes.is_empty() {
                let avg = valid_pes.iter().sum::<f64>() / valid_pes.len() as f64;
                valuation.push_str(&format!(" The 12-month average P/E is {:.2}.", avg));
            }
            valuation
        };

        let mut trends = FinancialTrends::default();
        // Reverse into chronological order so the trend reads oldest to newest
        for stmt in income.iter().rev() {
            let date = stmt.date.format("%Y-%m-%d");
            if let Some(revenue) = stmt.revenue {
                trends.revenue.push(format!("{}: {}", date, scaled_millions(revenue)));
            }
            if let Some(net_income) = stmt.net_income {
                trends
                    .net_income
                    .push(format!("{}: {}", date, scaled_millions(net_income)));
            }
            if let Some(ratio) = stmt.gross_profit_ratio {
                trends
                    .gross_margin
                    .push(format!("{}: {:.2}%", date, ratio * 100.0));
            }
        }
        for stmt in balance.iter().rev() {
            if let Some(total_debt) = stmt.total_debt {
                trends.total_debt.push(format!(
                    "{}: {}",
                    stmt.date.format("%Y-%m-%d"),
                    scaled_millions(total_debt)
                ));
            }
        }
        for stmt in cash_flow.iter().rev() {
            if let Some(fcf) = stmt.free_cash_flow {
                trends.free_cash_flow.push(format!(
                    "{}: {}",
                    stmt.date.format("%Y-%m-%d"),
                    scaled_millions(fcf)
                ));
            }
        }

        Ok(ContextSnapshot {
            ticker: ticker.to_string(),
            primary_text: primary_text.to_string(),
            valuation_context,
            financial_trends: trends,
        })
    }
}

fn scaled_millions(value: i64) -> String {
    format!("${:.2}M", value as f64 / 1_000_000.0)
}
