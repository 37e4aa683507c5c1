//! fact-store: the single shared, durable resource of the pipeline.
//!
//! All cross-component coordination happens through this store's uniqueness
//! constraints (insert-or-ignore / insert-or-merge), never through locks.
//! Raw facts are created by the pollers and read by the analysis path;
//! reports are written exactly once per source URL.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use intel_core::{
    Article, BalanceSheet, CashFlowStatement, Filing, IncomeStatement, Period, PriceObservation,
    Report, StatementBundle,
};
use sqlx::AnyPool;

#[cfg(test)]
mod tests;

/// Outcome of the idempotent report write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWrite {
    Created,
    AlreadyExists,
}

#[derive(Clone)]
pub struct FactStore {
    pool: AnyPool,
}

impl FactStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Connect and initialize the schema. `DATABASE_URL` selects the backend.
    pub async fn connect(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPool::connect(database_url).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Create all tables if missing. Uniqueness constraints declared here are
    /// the source of truth for every dedup contract in the pipeline.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                link TEXT NOT NULL UNIQUE,
                published_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sec_filings (
                id INTEGER PRIMARY KEY,
                ticker TEXT NOT NULL,
                form_type TEXT NOT NULL,
                filed_at TEXT NOT NULL,
                filing_url TEXT NOT NULL UNIQUE,
                filing_text TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS eod_prices (
                id INTEGER PRIMARY KEY,
                ticker TEXT NOT NULL,
                price_date TEXT NOT NULL,
                open_price REAL NOT NULL,
                high_price REAL NOT NULL,
                low_price REAL NOT NULL,
                close_price REAL NOT NULL,
                volume INTEGER NOT NULL,
                pe_ratio REAL,
                created_at TEXT NOT NULL,
                UNIQUE(ticker, price_date)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS income_statements (
                id INTEGER PRIMARY KEY,
                ticker TEXT NOT NULL,
                date TEXT NOT NULL,
                period TEXT NOT NULL,
                revenue INTEGER,
                cost_of_revenue INTEGER,
                gross_profit INTEGER,
                gross_profit_ratio REAL,
                net_income INTEGER,
                eps REAL,
                UNIQUE(ticker, date, period)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS balance_sheets (
                id INTEGER PRIMARY KEY,
                ticker TEXT NOT NULL,
                date TEXT NOT NULL,
                period TEXT NOT NULL,
                total_assets INTEGER,
                total_liabilities INTEGER,
                total_debt INTEGER,
                cash_and_equivalents INTEGER,
                total_equity INTEGER,
                UNIQUE(ticker, date, period)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cash_flow_statements (
                id INTEGER PRIMARY KEY,
                ticker TEXT NOT NULL,
                date TEXT NOT NULL,
                period TEXT NOT NULL,
                net_cash_from_ops INTEGER,
                net_cash_from_investing INTEGER,
                net_cash_from_financing INTEGER,
                free_cash_flow INTEGER,
                UNIQUE(ticker, date, period)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analyst_ratings (
                id INTEGER PRIMARY KEY,
                ticker TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                scraped_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY,
                source_url TEXT NOT NULL UNIQUE,
                ticker TEXT NOT NULL,
                thesis TEXT NOT NULL,
                context_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_eod_ticker_date ON eod_prices(ticker, price_date)")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_created ON reports(created_at)")
            .execute(&self.pool)
            .await
            .ok();

        Ok(())
    }

    /// Insert an article unless its link is already stored.
    /// Returns true when the row is new.
    pub async fn insert_article_if_new(&self, article: &Article) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO articles (source, title, link, published_at, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(link) DO NOTHING",
        )
        .bind(&article.source)
        .bind(&article.title)
        .bind(&article.link)
        .bind(article.published_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Insert a filing unless its URL is already stored.
    /// Returns true when the row is new.
    pub async fn insert_filing_if_new(&self, filing: &Filing) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO sec_filings (ticker, form_type, filed_at, filing_url, filing_text, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(filing_url) DO NOTHING",
        )
        .bind(&filing.ticker)
        .bind(filing.form.as_str())
        .bind(filing.filed_at.to_rfc3339())
        .bind(&filing.url)
        .bind(filing.text.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Look up a stored filing's form type and primary text by URL.
    pub async fn filing_text(&self, url: &str) -> Result<Option<(String, Option<String>)>> {
        let row: Option<(String, Option<String>)> = sqlx::query_as(
            "SELECT form_type, filing_text FROM sec_filings WHERE filing_url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Upsert one price observation. A later write for the same (ticker, date)
    /// replaces the OHLCV fields and fills the P/E when the new value is
    /// present, never duplicating the row or clearing a previously stored P/E.
    pub async fn upsert_price(&self, obs: &PriceObservation) -> Result<()> {
        sqlx::query(
            "INSERT INTO eod_prices
             (ticker, price_date, open_price, high_price, low_price, close_price, volume, pe_ratio, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(ticker, price_date) DO UPDATE SET
                open_price = excluded.open_price,
                high_price = excluded.high_price,
                low_price = excluded.low_price,
                close_price = excluded.close_price,
                volume = excluded.volume,
                pe_ratio = COALESCE(excluded.pe_ratio, eod_prices.pe_ratio)",
        )
        .bind(&obs.ticker)
        .bind(obs.date.format("%Y-%m-%d").to_string())
        .bind(obs.open)
        .bind(obs.high)
        .bind(obs.low)
        .bind(obs.close)
        .bind(obs.volume)
        .bind(obs.pe)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert one quarter's statements, skipping any kind already stored
    /// for (ticker, date, period).
    pub async fn insert_statements_if_new(&self, bundle: &StatementBundle) -> Result<()> {
        let income = &bundle.income;
        sqlx::query(
            "INSERT INTO income_statements
             (ticker, date, period, revenue, cost_of_revenue, gross_profit, gross_profit_ratio, net_income, eps)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(ticker, date, period) DO NOTHING",
        )
        .bind(&income.ticker)
        .bind(income.date.format("%Y-%m-%d").to_string())
        .bind(income.period.as_str())
        .bind(income.revenue)
        .bind(income.cost_of_revenue)
        .bind(income.gross_profit)
        .bind(income.gross_profit_ratio)
        .bind(income.net_income)
        .bind(income.eps)
        .execute(&self.pool)
        .await?;

        let balance = &bundle.balance;
        sqlx::query(
            "INSERT INTO balance_sheets
             (ticker, date, period, total_assets, total_liabilities, total_debt, cash_and_equivalents, total_equity)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(ticker, date, period) DO NOTHING",
        )
        .bind(&balance.ticker)
        .bind(balance.date.format("%Y-%m-%d").to_string())
        .bind(balance.period.as_str())
        .bind(balance.total_assets)
        .bind(balance.total_liabilities)
        .bind(balance.total_debt)
        .bind(balance.cash_and_equivalents)
        .bind(balance.total_equity)
        .execute(&self.pool)
        .await?;

        let cash_flow = &bundle.cash_flow;
        sqlx::query(
            "INSERT INTO cash_flow_statements
             (ticker, date, period, net_cash_from_ops, net_cash_from_investing, net_cash_from_financing, free_cash_flow)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(ticker, date, period) DO NOTHING",
        )
        .bind(&cash_flow.ticker)
        .bind(cash_flow.date.format("%Y-%m-%d").to_string())
        .bind(cash_flow.period.as_str())
        .bind(cash_flow.net_cash_from_ops)
        .bind(cash_flow.net_cash_from_investing)
        .bind(cash_flow.net_cash_from_financing)
        .bind(cash_flow.free_cash_flow)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append an analyst consensus observation (history, no dedup).
    pub async fn insert_rating(&self, ticker: &str, recommendation: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO analyst_ratings (ticker, recommendation, scraped_at) VALUES (?, ?, ?)",
        )
        .bind(ticker)
        .bind(recommendation)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent price observations for a ticker, newest first.
    pub async fn recent_prices(&self, ticker: &str, limit: i64) -> Result<Vec<PriceObservation>> {
        let rows: Vec<(String, String, f64, f64, f64, f64, i64, Option<f64>)> = sqlx::query_as(
            "SELECT ticker, price_date, open_price, high_price, low_price, close_price, volume, pe_ratio
             FROM eod_prices WHERE ticker = ? ORDER BY price_date DESC LIMIT ?",
        )
        .bind(ticker)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(ticker, date, open, high, low, close, volume, pe)| {
                Ok(PriceObservation {
                    ticker,
                    date: parse_date(&date)?,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    pe,
                })
            })
            .collect()
    }

    /// Most recent quarterly income statements, newest first.
    pub async fn recent_quarterly_income(
        &self,
        ticker: &str,
        limit: i64,
    ) -> Result<Vec<IncomeStatement>> {
        let rows: Vec<(
            String,
            String,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<f64>,
            Option<i64>,
            Option<f64>,
        )> = sqlx::query_as(
            "SELECT ticker, date, revenue, cost_of_revenue, gross_profit, gross_profit_ratio, net_income, eps
             FROM income_statements WHERE ticker = ? AND period = 'quarter'
             ORDER BY date DESC LIMIT ?",
        )
        .bind(ticker)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(ticker, date, revenue, cost_of_revenue, gross_profit, gross_profit_ratio, net_income, eps)| {
                    Ok(IncomeStatement {
                        ticker,
                        date: parse_date(&date)?,
                        period: Period::Quarter,
                        revenue,
                        cost_of_revenue,
                        gross_profit,
                        gross_profit_ratio,
                        net_income,
                        eps,
                    })
                },
            )
            .collect()
    }

    /// Most recent quarterly balance sheets, newest first.
    pub async fn recent_quarterly_balance(
        &self,
        ticker: &str,
        limit: i64,
    ) -> Result<Vec<BalanceSheet>> {
        let rows: Vec<(
            String,
            String,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<i64>,
        )> = sqlx::query_as(
            "SELECT ticker, date, total_assets, total_liabilities, total_debt, cash_and_equivalents, total_equity
             FROM balance_sheets WHERE ticker = ? AND period = 'quarter'
             ORDER BY date DESC LIMIT ?",
        )
        .bind(ticker)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(ticker, date, total_assets, total_liabilities, total_debt, cash_and_equivalents, total_equity)| {
                    Ok(BalanceSheet {
                        ticker,
                        date: parse_date(&date)?,
                        period: Period::Quarter,
                        total_assets,
                        total_liabilities,
                        total_debt,
                        cash_and_equivalents,
                        total_equity,
                    })
                },
            )
            .collect()
    }

    /// Most recent quarterly cash-flow statements, newest first.
    pub async fn recent_quarterly_cash_flow(
        &self,
        ticker: &str,
        limit: i64,
    ) -> Result<Vec<CashFlowStatement>> {
        let rows: Vec<(String, String, Option<i64>, Option<i64>, Option<i64>, Option<i64>)> =
            sqlx::query_as(
                "SELECT ticker, date, net_cash_from_ops, net_cash_from_investing, net_cash_from_financing, free_cash_flow
                 FROM cash_flow_statements WHERE ticker = ? AND period = 'quarter'
                 ORDER BY date DESC LIMIT ?",
            )
            .bind(ticker)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(
                |(ticker, date, net_cash_from_ops, net_cash_from_investing, net_cash_from_financing, free_cash_flow)| {
                    Ok(CashFlowStatement {
                        ticker,
                        date: parse_date(&date)?,
                        period: Period::Quarter,
                        net_cash_from_ops,
                        net_cash_from_investing,
                        net_cash_from_financing,
                        free_cash_flow,
                    })
                },
            )
            .collect()
    }

    /// The idempotency boundary of the pipeline: insert a report unless one
    /// already exists for the source URL. The uniqueness constraint, not an
    /// existence check, decides the winner under concurrent duplicate
    /// deliveries; losing is a benign `AlreadyExists`.
    pub async fn write_report_if_absent(
        &self,
        source_url: &str,
        ticker: &str,
        thesis: &str,
        context_json: &str,
    ) -> Result<ReportWrite> {
        let result = sqlx::query(
            "INSERT INTO reports (source_url, ticker, thesis, context_json, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(source_url) DO NOTHING",
        )
        .bind(source_url)
        .bind(ticker)
        .bind(thesis)
        .bind(context_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(ReportWrite::Created)
        } else {
            Ok(ReportWrite::AlreadyExists)
        }
    }

    /// Most recent reports, newest first. The sole read interface of the
    /// presentation layer.
    pub async fn recent_reports(&self, limit: i64) -> Result<Vec<Report>> {
        let rows: Vec<(i64, String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, source_url, ticker, thesis, context_json, created_at
             FROM reports ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, source_url, ticker, thesis, context_json, created_at)| Report {
                id,
                source_url,
                ticker,
                thesis,
                context_json,
                created_at,
            })
            .collect())
    }

    /// Explicit full reset: wipe every fact and report. Operator action only,
    /// never invoked by the pipeline itself.
    pub async fn reset_all(&self) -> Result<()> {
        for table in [
            "reports",
            "analyst_ratings",
            "cash_flow_statements",
            "balance_sheets",
            "income_statements",
            "eod_prices",
            "sec_filings",
            "articles",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&self.pool)
                .await?;
        }
        tracing::warn!("Fact store fully reset");
        Ok(())
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("bad date {:?} in store: {}", s, e))
}
