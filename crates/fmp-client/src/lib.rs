//! fmp-client: HTTP client for the market-data / filing-index provider.
//!
//! Implements the `intel-core` provider traits against the FMP v3 REST API
//! plus direct filing-page downloads. All calls carry a bounded timeout and
//! go through a sliding-window rate limiter with automatic 429 retry.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use intel_core::{
    FilingProvider, FilingRef, IntelError, MarketDataProvider, PriceObservation, RatingsProvider,
    StatementBundle,
};
use intel_core::{BalanceSheet, CashFlowStatement, IncomeStatement, Period};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

/// Filing pages reject requests without a browser user agent.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let oldest = *ts.front().expect("non-empty window");
            let sleep_dur =
                self.window.saturating_sub(now.duration_since(oldest)) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for FMP API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct FmpClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl FmpClient {
    pub fn new(api_key: String) -> Self {
        // Free tier allows ~250 calls/day; the default window keeps a polite
        // pace. Override with FMP_RATE_LIMIT for paid plans.
        let rate_limit: usize = std::env::var("FMP_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, IntelError> {
        let request = builder
            .build()
            .map_err(|e| IntelError::ApiError(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| IntelError::ApiError("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| IntelError::ApiError(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(
                "FMP 429 rate limited, waiting {}s before retry {}/3",
                wait_secs,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(IntelError::ApiError(
            "Rate limited by FMP after 3 retries".to_string(),
        ))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, IntelError> {
        if !response.status().is_success() {
            return Err(IntelError::ApiError(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    #[serde(default)]
    historical: Vec<HistoricalRow>,
}

#[derive(Debug, Deserialize)]
struct HistoricalRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    pe: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AsReportedRow {
    date: String,
    #[serde(default)]
    revenue: Option<f64>,
    #[serde(default)]
    costofrevenue: Option<f64>,
    #[serde(default)]
    grossprofit: Option<f64>,
    #[serde(default)]
    grossprofitratio: Option<f64>,
    #[serde(default)]
    netincome: Option<f64>,
    #[serde(default)]
    eps: Option<f64>,
    #[serde(default)]
    totalassets: Option<f64>,
    #[serde(default)]
    totalliabilities: Option<f64>,
    #[serde(default)]
    totaldebt: Option<f64>,
    #[serde(default)]
    cashandcashequivalents: Option<f64>,
    #[serde(default)]
    totalstockholdersequity: Option<f64>,
    #[serde(default)]
    netcashprovidedbyoperatingactivities: Option<f64>,
    #[serde(default)]
    netcashusedforinvestingactivities: Option<f64>,
    #[serde(default)]
    netcashusedprovidedbyfinancingactivities: Option<f64>,
    #[serde(default)]
    freecashflow: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FilingRow {
    #[serde(rename = "type")]
    form_type: String,
    #[serde(rename = "fillingDate")]
    filing_date: String,
    #[serde(rename = "finalLink", default)]
    final_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendationRow {
    #[serde(default)]
    rating: Option<String>,
}

fn as_whole(v: Option<f64>) -> Option<i64> {
    v.map(|x| x as i64)
}

#[async_trait]
impl MarketDataProvider for FmpClient {
    async fn daily_prices(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceObservation>, IntelError> {
        let url = format!("{}/historical-price-full/{}", BASE_URL, ticker);
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("from", from.format("%Y-%m-%d").to_string()),
                ("to", to.format("%Y-%m-%d").to_string()),
                ("apikey", self.api_key.clone()),
            ]))
            .await?;
        let response = Self::check_status(response).await?;

        let body: HistoricalResponse = response
            .json()
            .await
            .map_err(|e| IntelError::ApiError(e.to_string()))?;

        let mut observations = Vec::with_capacity(body.historical.len());
        for row in body.historical {
            let date = match NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => {
                    // Malformed row: skip, never retry
                    tracing::warn!("{}: skipping price row with bad date {:?}", ticker, row.date);
                    continue;
                }
            };
            observations.push(PriceObservation {
                ticker: ticker.to_string(),
                date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume as i64,
                pe: row.pe,
            });
        }
        Ok(observations)
    }

    async fn quarterly_financials(
        &self,
        ticker: &str,
        limit: u32,
    ) -> Result<Vec<StatementBundle>, IntelError> {
        let url = format!("{}/financial-statement-full-as-reported/{}", BASE_URL, ticker);
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("period", "quarter".to_string()),
                ("limit", limit.to_string()),
                ("apikey", self.api_key.clone()),
            ]))
            .await?;
        let response = Self::check_status(response).await?;

        let rows: Vec<AsReportedRow> = response
            .json()
            .await
            .map_err(|e| IntelError::ApiError(e.to_string()))?;

        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            let date = match NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => {
                    tracing::warn!(
                        "{}: skipping statement row with bad date {:?}",
                        ticker,
                        row.date
                    );
                    continue;
                }
            };
            bundles.push(StatementBundle {
                income: IncomeStatement {
                    ticker: ticker.to_string(),
                    date,
                    period: Period::Quarter,
                    revenue: as_whole(row.revenue),
                    cost_of_revenue: as_whole(row.costofrevenue),
                    gross_profit: as_whole(row.grossprofit),
                    gross_profit_ratio: row.grossprofitratio,
                    net_income: as_whole(row.netincome),
                    eps: row.eps,
                },
                balance: BalanceSheet {
                    ticker: ticker.to_string(),
                    date,
                    period: Period::Quarter,
                    total_assets: as_whole(row.totalassets),
                    total_liabilities: as_whole(row.totalliabilities),
                    total_debt: as_whole(row.totaldebt),
                    cash_and_equivalents: as_whole(row.cashandcashequivalents),
                    total_equity: as_whole(row.totalstockholdersequity),
                },
                cash_flow: CashFlowStatement {
                    ticker: ticker.to_string(),
                    date,
                    period: Period::Quarter,
                    net_cash_from_ops: as_whole(row.netcashprovidedbyoperatingactivities),
                    net_cash_from_investing: as_whole(row.netcashusedforinvestingactivities),
                    net_cash_from_financing: as_whole(row.netcashusedprovidedbyfinancingactivities),
                    free_cash_flow: as_whole(row.freecashflow),
                },
            });
        }
        Ok(bundles)
    }
}

#[async_trait]
impl FilingProvider for FmpClient {
    async fn filing_index(&self, ticker: &str, limit: u32) -> Result<Vec<FilingRef>, IntelError> {
        let url = format!("{}/sec_filings/{}", BASE_URL, ticker);
        let response = self
            .send_request(self.client.get(&url).query(&[
                ("limit", limit.to_string()),
                ("apikey", self.api_key.clone()),
            ]))
            .await?;
        let response = Self::check_status(response).await?;

        let rows: Vec<FilingRow> = response
            .json()
            .await
            .map_err(|e| IntelError::ApiError(e.to_string()))?;

        let mut refs = Vec::new();
        for row in rows {
            let Some(link) = row.final_link.filter(|l| !l.is_empty()) else {
                tracing::warn!("{}: filing row without finalLink, skipping", ticker);
                continue;
            };
            let filed_at = NaiveDateTime::parse_from_str(&row.filing_date, "%Y-%m-%d %H:%M:%S")
                .map(|naive| Utc.from_utc_datetime(&naive));
            let Ok(filed_at) = filed_at else {
                tracing::warn!(
                    "{}: skipping filing row with bad date {:?}",
                    ticker,
                    row.filing_date
                );
                continue;
            };
            refs.push(FilingRef {
                form_type: row.form_type,
                filed_at,
                url: link,
            });
        }
        Ok(refs)
    }

    async fn fetch_document(&self, url: &str) -> Result<String, IntelError> {
        let response = self
            .send_request(
                self.client
                    .get(url)
                    .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
                    .timeout(Duration::from_secs(30)),
            )
            .await?;
        let response = Self::check_status(response).await?;

        response
            .text()
            .await
            .map_err(|e| IntelError::ApiError(e.to_string()))
    }
}

#[async_trait]
impl RatingsProvider for FmpClient {
    async fn consensus_rating(&self, ticker: &str) -> Result<Option<String>, IntelError> {
        let url = format!("{}/analyst-recommendations/{}", BASE_URL, ticker);
        let response = self
            .send_request(
                self.client
                    .get(&url)
                    .query(&[("apikey", self.api_key.clone())]),
            )
            .await?;
        let response = Self::check_status(response).await?;

        let rows: Vec<RecommendationRow> = response
            .json()
            .await
            .map_err(|e| IntelError::ApiError(e.to_string()))?;

        Ok(rows.into_iter().next().and_then(|r| r.rating))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_response_tolerates_missing_pe() {
        let json = r#"{
            "symbol": "ACME",
            "historical": [
                {"date": "2024-01-02", "open": 49.0, "high": 51.0, "low": 48.0, "close": 50.0, "volume": 1000000},
                {"date": "2024-01-03", "open": 50.0, "high": 52.0, "low": 49.5, "close": 51.0, "volume": 900000, "pe": 18.2}
            ]
        }"#;
        let parsed: HistoricalResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.historical.len(), 2);
        assert_eq!(parsed.historical[0].pe, None);
        assert_eq!(parsed.historical[1].pe, Some(18.2));
    }

    #[test]
    fn filing_row_maps_provider_field_names() {
        let json = r#"[{"type": "8-K", "fillingDate": "2024-01-02 16:30:00", "finalLink": "https://sec.example/doc"}]"#;
        let rows: Vec<FilingRow> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].form_type, "8-K");
        assert_eq!(rows[0].final_link.as_deref(), Some("https://sec.example/doc"));
    }

    #[test]
    fn as_reported_row_defaults_absent_line_items() {
        let json = r#"[{"date": "2024-03-31", "revenue": 12000000.0}]"#;
        let rows: Vec<AsReportedRow> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].revenue, Some(12_000_000.0));
        assert_eq!(rows[0].freecashflow, None);
    }
}
