use crate::extract::extract_text;
use crate::retry::with_retry;
use anyhow::Result;
use event_bus::{EventBus, EventEnvelope};
use fact_store::FactStore;
use intel_core::{Filing, FilingForm, FilingProvider, EXTRACTION_SENTINEL};
use std::sync::Arc;
use std::time::Duration;

const FETCH_ATTEMPTS: u32 = 3;
const PUBLISH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
const INDEX_LIMIT: u32 = 100;

/// Fetches the filing index per tracked ticker, downloads novel filings,
/// extracts their primary text and publishes an analysis event per novel row.
pub struct FilingPoller {
    provider: Arc<dyn FilingProvider>,
    store: FactStore,
    bus: Arc<dyn EventBus>,
    tickers: Vec<String>,
}

impl FilingPoller {
    pub fn new(
        provider: Arc<dyn FilingProvider>,
        store: FactStore,
        bus: Arc<dyn EventBus>,
        tickers: Vec<String>,
    ) -> Self {
        Self {
            provider,
            store,
            bus,
            tickers,
        }
    }

    /// One pass over every tracked ticker. Returns the number of filings
    /// newly stored.
    pub async fn poll(&self) -> Result<u64> {
        let mut stored = 0u64;

        for ticker in &self.tickers {
            let index = match with_retry(ticker, FETCH_ATTEMPTS, RETRY_BASE_DELAY, || {
                self.provider.filing_index(ticker, INDEX_LIMIT)
            })
            .await
            {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!("{}: skipping filing index this pass: {}", ticker, e);
                    continue;
                }
            };

            for filing_ref in index {
                // Form types outside the tracked set are a permanent shape
                // mismatch: skipped, never retried
                let Some(form) = FilingForm::parse(&filing_ref.form_type) else {
                    continue;
                };

                // Cheap pre-check so known filings are not re-downloaded;
                // the URL constraint still guards against races
                if self.store.filing_text(&filing_ref.url).await?.is_some() {
                    continue;
                }

                // Extraction failure stores the sentinel, never blocks the row
                let text = match with_retry(&filing_ref.url, FETCH_ATTEMPTS, RETRY_BASE_DELAY, || {
                    self.provider.fetch_document(&filing_ref.url)
                })
                .await
                {
                    Ok(body) => extract_text(&body).unwrap_or_else(|| EXTRACTION_SENTINEL.to_string()),
                    Err(e) => {
                        tracing::warn!("{}: cannot download {}: {}", ticker, filing_ref.url, e);
                        EXTRACTION_SENTINEL.to_string()
                    }
                };

                let filing = Filing {
                    ticker: ticker.clone(),
                    form,
                    filed_at: filing_ref.filed_at,
                    url: filing_ref.url.clone(),
                    text: Some(text),
                };

                let created = self.store.insert_filing_if_new(&filing).await?;
                if !created {
                    continue;
                }
                stored += 1;

                tracing::info!("{}: new {} filing {}", ticker, form.as_str(), filing.url);
                let envelope = EventEnvelope::filing(
                    ticker.clone(),
                    form.as_str(),
                    filing.url.clone(),
                    filing.filed_at,
                );
                if let Err(e) = with_retry("publish", PUBLISH_ATTEMPTS, RETRY_BASE_DELAY, || {
                    self.bus.publish(&envelope)
                })
                .await
                {
                    tracing::warn!("Dropping analysis request for {}: {}", filing.url, e);
                }
            }
        }

        Ok(stored)
    }
}
