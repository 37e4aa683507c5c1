use intel_core::TextModel;
use std::sync::Arc;

/// Persisted in place of a thesis when the model call fails or returns
/// nothing. The pipeline always makes forward progress; it never blocks on
/// its least reliable dependency.
pub const SYNTHESIS_FAILED: &str =
    "Synthesis unavailable: the analysis service could not produce a thesis for this event.";

/// Combines primary text + market context into one model call.
/// A pure textual transform from the pipeline's point of view.
pub struct SynthesisInvoker {
    model: Arc<dyn TextModel>,
}

impl SynthesisInvoker {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    fn build_prompt(primary_text: &str, context_text: &str) -> String {
        format!(
            "You are a neutral financial analyst for an objective newswire. Your task is to \
             write a 2-5 sentence news snippet synthesizing the provided data points.\n\
             Do not invent information or speculate on future stock prices.\n\
             If the data points are contradictory (e.g., good news but the stock is down), \
             highlight the contradiction.\n\
             If they are aligned (e.g., bad news and the stock is down), suggest the \
             correlation.\n\
             If no market context is available, state only what the primary source says.\n\
             \n\
             DATA POINTS:\n\
             - Primary Source: \"{}\"\n\
             - Market Context: \"{}\"\n\
             \n\
             Generate the news snippet based only on the data provided.",
            primary_text, context_text
        )
    }

    /// Never raises past this boundary: any internal failure degrades to the
    /// fixed sentinel string, which is still persisted.
    pub async fn synthesize(&self, primary_text: &str, context_text: &str) -> String {
        let prompt = Self::build_prompt(primary_text, context_text);
        match self.model.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Synthesis returned an empty reply, using failure sentinel");
                SYNTHESIS_FAILED.to_string()
            }
            Err(e) => {
                tracing::warn!("Synthesis call failed: {}, using failure sentinel", e);
                SYNTHESIS_FAILED.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intel_core::IntelError;

    struct StubModel {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl TextModel for StubModel {
        async fn generate(&self, _prompt: &str) -> Result<String, IntelError> {
            self.reply.clone().map_err(IntelError::ModelError)
        }
    }

    #[tokio::test]
    async fn successful_synthesis_returns_trimmed_text() {
        let invoker = SynthesisInvoker::new(Arc::new(StubModel {
            reply: Ok("  A concise thesis.\n".to_string()),
        }));
        let thesis = invoker.synthesize("headline", "context").await;
        assert_eq!(thesis, "A concise thesis.");
    }

    #[tokio::test]
    async fn model_failure_degrades_to_sentinel() {
        let invoker = SynthesisInvoker::new(Arc::new(StubModel {
            reply: Err("timeout".to_string()),
        }));
        let thesis = invoker.synthesize("headline", "context").await;
        assert_eq!(thesis, SYNTHESIS_FAILED);
    }

    #[tokio::test]
    async fn empty_reply_degrades_to_sentinel() {
        let invoker = SynthesisInvoker::new(Arc::new(StubModel {
            reply: Ok("   \n".to_string()),
        }));
        let thesis = invoker.synthesize("headline", "context").await;
        assert_eq!(thesis, SYNTHESIS_FAILED);
    }

    #[test]
    fn prompt_carries_both_data_points_and_guardrails() {
        let prompt = SynthesisInvoker::build_prompt("Acme Corp beats earnings", "Closed at $50.00");
        assert!(prompt.contains("Acme Corp beats earnings"));
        assert!(prompt.contains("Closed at $50.00"));
        assert!(prompt.contains("Do not invent information or speculate on future stock prices."));
        assert!(prompt.contains("highlight the contradiction"));
    }
}
