use crate::context::ContextAssembler;
use crate::synthesis::SynthesisInvoker;
use event_bus::{EventEnvelope, EventKind};
use fact_store::{FactStore, ReportWrite};
use intel_core::EXTRACTION_SENTINEL;

/// Filing bodies can run to megabytes; the prompt only needs the head.
const MAX_PRIMARY_TEXT_CHARS: usize = 12_000;

/// Terminal state of one delivery.
///
/// `Persisted`, `AlreadyReported` and `Dropped` are terminal with no further
/// side effects. `Failed` is not terminal from the transport's point of view;
/// redelivery re-enters the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Persisted,
    AlreadyReported,
    Dropped,
    Failed,
}

pub struct AnalysisWorker {
    store: FactStore,
    assembler: ContextAssembler,
    synthesizer: SynthesisInvoker,
}

impl AnalysisWorker {
    pub fn new(store: FactStore, assembler: ContextAssembler, synthesizer: SynthesisInvoker) -> Self {
        Self {
            store,
            assembler,
            synthesizer,
        }
    }

    /// Process one delivery end to end. Safe to invoke concurrently for the
    /// same report key; the store's uniqueness constraint picks one winner.
    pub async fn handle(&self, envelope: &EventEnvelope) -> DeliveryOutcome {
        if let Err(e) = envelope.validate() {
            tracing::warn!("Dropping invalid envelope: {}", e);
            return DeliveryOutcome::Dropped;
        }

        let ticker = envelope.ticker.as_str();
        let primary_text = match self.primary_text(envelope).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("{}: cannot load primary text: {}", ticker, e);
                return DeliveryOutcome::Failed;
            }
        };

        let snapshot = match self.assembler.assemble(ticker, &primary_text).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("{}: context assembly failed: {}", ticker, e);
                return DeliveryOutcome::Failed;
            }
        };

        let thesis = self
            .synthesizer
            .synthesize(&primary_text, &snapshot.context_text())
            .await;
        let context_json =
            serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());

        let key = envelope.report_key();
        match self
            .store
            .write_report_if_absent(&key, ticker, &thesis, &context_json)
            .await
        {
            Ok(ReportWrite::Created) => {
                tracing::info!("{}: report persisted for {}", ticker, key);
                DeliveryOutcome::Persisted
            }
            Ok(ReportWrite::AlreadyExists) => {
                tracing::info!("{}: report already exists for {}, skipping", ticker, key);
                DeliveryOutcome::AlreadyReported
            }
            Err(e) => {
                tracing::error!("{}: report write failed: {}", ticker, e);
                DeliveryOutcome::Failed
            }
        }
    }

    /// The primary text handed to synthesis, per event kind.
    async fn primary_text(&self, envelope: &EventEnvelope) -> anyhow::Result<String> {
        match envelope.event_type {
            EventKind::SignificantNews => Ok(envelope
                .headline
                .clone()
                .unwrap_or_else(|| "News headline was not provided.".to_string())),
            EventKind::SecFiling => {
                let url = envelope.url.as_deref().unwrap_or_default();
                let stored = self.store.filing_text(url).await?;
                let (form, text) = match stored {
                    Some((form, text)) => (form, text),
                    None => (envelope.form.clone().unwrap_or_else(|| "filing".to_string()), None),
                };
                let usable =
                    text.filter(|t| !t.trim().is_empty() && t.as_str() != EXTRACTION_SENTINEL);
                Ok(match usable {
                    Some(text) => text.chars().take(MAX_PRIMARY_TEXT_CHARS).collect(),
                    None => format!(
                        "A new {} was submitted, but the press release text could not be extracted.",
                        form
                    ),
                })
            }
            EventKind::Scheduled => Ok(format!(
                "Scheduled review of recent market activity for {}.",
                envelope.ticker
            )),
        }
    }
}
