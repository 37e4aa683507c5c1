use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One end-of-day price observation for a tracked ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    #[serde(default)]
    pub pe: Option<f64>,
}

/// Reporting period of a financial statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Quarter,
    Annual,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Quarter => "quarter",
            Period::Annual => "annual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quarter" => Some(Period::Quarter),
            "annual" => Some(Period::Annual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub ticker: String,
    pub date: NaiveDate,
    pub period: Period,
    pub revenue: Option<i64>,
    pub cost_of_revenue: Option<i64>,
    pub gross_profit: Option<i64>,
    pub gross_profit_ratio: Option<f64>,
    pub net_income: Option<i64>,
    pub eps: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub ticker: String,
    pub date: NaiveDate,
    pub period: Period,
    pub total_assets: Option<i64>,
    pub total_liabilities: Option<i64>,
    pub total_debt: Option<i64>,
    pub cash_and_equivalents: Option<i64>,
    pub total_equity: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashFlowStatement {
    pub ticker: String,
    pub date: NaiveDate,
    pub period: Period,
    pub net_cash_from_ops: Option<i64>,
    pub net_cash_from_investing: Option<i64>,
    pub net_cash_from_financing: Option<i64>,
    pub free_cash_flow: Option<i64>,
}

/// One quarter's worth of statements as reported by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementBundle {
    pub income: IncomeStatement,
    pub balance: BalanceSheet,
    pub cash_flow: CashFlowStatement,
}

/// The closed set of filing forms the pipeline ingests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilingForm {
    EightK,
    TenK,
    TenQ,
}

impl FilingForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilingForm::EightK => "8-K",
            FilingForm::TenK => "10-K",
            FilingForm::TenQ => "10-Q",
        }
    }

    /// Returns None for any form type outside the tracked set
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "8-K" => Some(FilingForm::EightK),
            "10-K" => Some(FilingForm::TenK),
            "10-Q" => Some(FilingForm::TenQ),
            _ => None,
        }
    }
}

/// One entry from a provider's filing index, form type not yet validated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingRef {
    pub form_type: String,
    pub filed_at: DateTime<Utc>,
    pub url: String,
}

/// Stored in place of filing text when extraction fails; the record itself
/// is never blocked on extraction.
pub const EXTRACTION_SENTINEL: &str = "Text not available.";

/// A filing as stored, with extracted primary text (or the extraction sentinel)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filing {
    pub ticker: String,
    pub form: FilingForm,
    pub filed_at: DateTime<Utc>,
    pub url: String,
    pub text: Option<String>,
}

/// A news article as fetched from a feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub source: String,
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
}

/// One item from a syndication feed, before storage
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

/// Quarterly line-item trends rendered as human-readable scaled strings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialTrends {
    pub revenue: Vec<String>,
    pub net_income: Vec<String>,
    pub gross_margin: Vec<String>,
    pub total_debt: Vec<String>,
    pub free_cash_flow: Vec<String>,
}

/// Bounded point-in-time read of price/financial history for one synthesis call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub ticker: String,
    pub primary_text: String,
    pub valuation_context: String,
    pub financial_trends: FinancialTrends,
}

impl ContextSnapshot {
    /// Render the snapshot as the context block handed to the synthesis prompt
    pub fn context_text(&self) -> String {
        let trends = serde_json::to_string_pretty(&self.financial_trends)
            .unwrap_or_else(|_| "{}".to_string());
        format!(
            "{}\nFinancial snapshot (last 8 quarters): {}",
            self.valuation_context, trends
        )
    }
}

/// A persisted report row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub source_url: String,
    pub ticker: String,
    pub thesis: String,
    pub context_json: String,
    pub created_at: String,
}
