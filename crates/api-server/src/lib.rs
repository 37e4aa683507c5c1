//! api-server: read-only report viewer.
//!
//! The sole interface consumed by the presentation layer: the most recent
//! reports, newest first. A store failure degrades to an empty list, so the
//! worst a user ever sees is "no reports yet".

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use fact_store::FactStore;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub store: FactStore,
}

#[derive(Deserialize)]
pub struct ReportsQuery {
    /// Number of reports to return (default 50, capped at 500)
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
pub struct ReportView {
    pub source_url: String,
    pub ticker: String,
    pub thesis: String,
    pub context: serde_json::Value,
    pub created_at: String,
}

impl From<intel_core::Report> for ReportView {
    fn from(report: intel_core::Report) -> Self {
        let context =
            serde_json::from_str(&report.context_json).unwrap_or(serde_json::Value::Null);
        Self {
            source_url: report.source_url,
            ticker: report.ticker,
            thesis: report.thesis,
            context,
            created_at: report.created_at,
        }
    }
}

pub(crate) async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportsQuery>,
) -> Json<Vec<ReportView>> {
    let limit = query.limit.clamp(1, 500);
    match state.store.recent_reports(limit).await {
        Ok(reports) => Json(reports.into_iter().map(ReportView::from).collect()),
        Err(e) => {
            tracing::warn!("Report read failed: {}", e);
            Json(Vec::new())
        }
    }
}

pub(crate) async fn health() -> &'static str {
    "OK"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/reports", get(list_reports))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(store: FactStore, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(AppState { store });
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Report viewer listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_state() -> AppState {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let store = FactStore::new(pool);
        store.init_schema().await.unwrap();
        AppState { store }
    }

    #[tokio::test]
    async fn reports_come_back_newest_first_with_parsed_context() {
        let state = setup_state().await;
        state
            .store
            .write_report_if_absent("https://x/1", "ACME", "First.", r#"{"ticker":"ACME"}"#)
            .await
            .unwrap();
        state
            .store
            .write_report_if_absent("https://x/2", "ACME", "Second.", r#"{"ticker":"ACME"}"#)
            .await
            .unwrap();

        let Json(reports) =
            list_reports(State(state), Query(ReportsQuery { limit: 10 })).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].source_url, "https://x/2");
        assert_eq!(reports[0].context["ticker"], "ACME");
    }

    #[tokio::test]
    async fn empty_store_yields_empty_list() {
        let state = setup_state().await;
        let Json(reports) =
            list_reports(State(state), Query(ReportsQuery { limit: 10 })).await;
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn limit_is_clamped() {
        let state = setup_state().await;
        state
            .store
            .write_report_if_absent("https://x/1", "ACME", "First.", "{}")
            .await
            .unwrap();

        let Json(reports) =
            list_reports(State(state), Query(ReportsQuery { limit: 0 })).await;
        assert_eq!(reports.len(), 1);
    }
}
