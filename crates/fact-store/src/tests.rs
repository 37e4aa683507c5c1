use crate::{FactStore, ReportWrite};
use chrono::{NaiveDate, TimeZone, Utc};
use intel_core::{
    Article, BalanceSheet, CashFlowStatement, Filing, FilingForm, IncomeStatement, Period,
    PriceObservation, StatementBundle,
};

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

fn article(link: &str, title: &str) -> Article {
    Article {
        source: "Test Wire".to_string(),
        title: title.to_string(),
        link: link.to_string(),
        published_at: Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap(),
    }
}

fn price(ticker: &str, date: &str, close: f64, pe: Option<f64>) -> PriceObservation {
    PriceObservation {
        ticker: ticker.to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1_000_000,
        pe,
    }
}

fn bundle(ticker: &str, date: &str) -> StatementBundle {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    StatementBundle {
        income: IncomeStatement {
            ticker: ticker.to_string(),
            date,
            period: Period::Quarter,
            revenue: Some(12_000_000),
            cost_of_revenue: Some(7_000_000),
            gross_profit: Some(5_000_000),
            gross_profit_ratio: Some(0.4167),
            net_income: Some(2_000_000),
            eps: Some(0.42),
        },
        balance: BalanceSheet {
            ticker: ticker.to_string(),
            date,
            period: Period::Quarter,
            total_assets: Some(80_000_000),
            total_liabilities: Some(30_000_000),
            total_debt: Some(10_000_000),
            cash_and_equivalents: Some(15_000_000),
            total_equity: Some(50_000_000),
        },
        cash_flow: CashFlowStatement {
            ticker: ticker.to_string(),
            date,
            period: Period::Quarter,
            net_cash_from_ops: Some(3_000_000),
            net_cash_from_investing: Some(-1_000_000),
            net_cash_from_financing: Some(-500_000),
            free_cash_flow: Some(2_000_000),
        },
    }
}

async fn count(store: &FactStore, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(store.pool())
        .await
        .unwrap();
    n
}

#[tokio::test]
async fn article_ingestion_is_idempotent() {
    let store = setup_store().await;

    let a = article("https://x/1", "Acme Corp beats earnings");
    assert!(store.insert_article_if_new(&a).await.unwrap());
    assert!(!store.insert_article_if_new(&a).await.unwrap());
    assert_eq!(count(&store, "articles").await, 1);

    // Different link is a different fact
    let b = article("https://x/2", "Acme Corp beats earnings");
    assert!(store.insert_article_if_new(&b).await.unwrap());
    assert_eq!(count(&store, "articles").await, 2);
}

#[tokio::test]
async fn filing_ingestion_is_idempotent() {
    let store = setup_store().await;

    let filing = Filing {
        ticker: "ACME".to_string(),
        form: FilingForm::EightK,
        filed_at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        url: "https://sec.example/acme-8k".to_string(),
        text: Some("Acme announces results".to_string()),
    };

    assert!(store.insert_filing_if_new(&filing).await.unwrap());
    assert!(!store.insert_filing_if_new(&filing).await.unwrap());
    assert_eq!(count(&store, "sec_filings").await, 1);

    let (form, text) = store
        .filing_text("https://sec.example/acme-8k")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(form, "8-K");
    assert_eq!(text.as_deref(), Some("Acme announces results"));
}

#[tokio::test]
async fn price_upsert_fills_pe_without_duplicating() {
    let store = setup_store().await;

    store
        .upsert_price(&price("ACME", "2024-01-02", 50.0, None))
        .await
        .unwrap();
    // Re-ingestion with the P/E now available fills the field in place
    store
        .upsert_price(&price("ACME", "2024-01-02", 50.0, Some(18.0)))
        .await
        .unwrap();
    assert_eq!(count(&store, "eod_prices").await, 1);

    let prices = store.recent_prices("ACME", 10).await.unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0].pe, Some(18.0));

    // A later write without a P/E must not clear the stored one
    store
        .upsert_price(&price("ACME", "2024-01-02", 51.0, None))
        .await
        .unwrap();
    let prices = store.recent_prices("ACME", 10).await.unwrap();
    assert_eq!(prices[0].close, 51.0);
    assert_eq!(prices[0].pe, Some(18.0));
}

#[tokio::test]
async fn recent_prices_are_newest_first() {
    let store = setup_store().await;

    for (date, close) in [("2024-01-02", 50.0), ("2024-01-04", 52.0), ("2024-01-03", 51.0)] {
        store.upsert_price(&price("ACME", date, close, None)).await.unwrap();
    }

    let prices = store.recent_prices("ACME", 2).await.unwrap();
    assert_eq!(prices.len(), 2);
    assert_eq!(prices[0].close, 52.0);
    assert_eq!(prices[1].close, 51.0);
}

#[tokio::test]
async fn statement_ingestion_is_idempotent() {
    let store = setup_store().await;

    let b = bundle("ACME", "2024-03-31");
    store.insert_statements_if_new(&b).await.unwrap();
    store.insert_statements_if_new(&b).await.unwrap();

    assert_eq!(count(&store, "income_statements").await, 1);
    assert_eq!(count(&store, "balance_sheets").await, 1);
    assert_eq!(count(&store, "cash_flow_statements").await, 1);

    let income = store.recent_quarterly_income("ACME", 8).await.unwrap();
    assert_eq!(income.len(), 1);
    assert_eq!(income[0].revenue, Some(12_000_000));
}

#[tokio::test]
async fn report_write_is_idempotent() {
    let store = setup_store().await;

    let first = store
        .write_report_if_absent("https://x/1", "ACME", "Thesis.", "{}")
        .await
        .unwrap();
    assert_eq!(first, ReportWrite::Created);

    let second = store
        .write_report_if_absent("https://x/1", "ACME", "A different thesis.", "{}")
        .await
        .unwrap();
    assert_eq!(second, ReportWrite::AlreadyExists);

    let reports = store.recent_reports(10).await.unwrap();
    assert_eq!(reports.len(), 1);
    // The first write wins; redelivery never rewrites a report
    assert_eq!(reports[0].thesis, "Thesis.");
}

#[tokio::test]
async fn recent_reports_are_newest_first() {
    let store = setup_store().await;

    store
        .write_report_if_absent("https://x/1", "ACME", "First.", "{}")
        .await
        .unwrap();
    store
        .write_report_if_absent("https://x/2", "ACME", "Second.", "{}")
        .await
        .unwrap();

    let reports = store.recent_reports(10).await.unwrap();
    assert_eq!(reports.len(), 2);
    // Same-timestamp rows fall back to insertion order, newest first
    assert_eq!(reports[0].source_url, "https://x/2");
    assert_eq!(reports[1].source_url, "https://x/1");
}

#[tokio::test]
async fn reset_all_clears_every_table() {
    let store = setup_store().await;

    store
        .insert_article_if_new(&article("https://x/1", "t"))
        .await
        .unwrap();
    store
        .upsert_price(&price("ACME", "2024-01-02", 50.0, None))
        .await
        .unwrap();
    store
        .write_report_if_absent("https://x/1", "ACME", "Thesis.", "{}")
        .await
        .unwrap();

    store.reset_all().await.unwrap();

    assert_eq!(count(&store, "articles").await, 0);
    assert_eq!(count(&store, "eod_prices").await, 0);
    assert_eq!(count(&store, "reports").await, 0);
}
