//! entity-resolver: maps free text to zero-or-one tracked identifier.
//!
//! The canonical path delegates to a classification call against the closed
//! company directory; the reply is accepted only on an exact (case-folded)
//! reverse-map hit. Ambiguous or off-target mentions must resolve to no
//! match rather than a guess, because a wrong resolution becomes a wrong,
//! permanently persisted report.

mod directory;

pub use directory::CompanyDirectory;

use intel_core::TextModel;
use std::sync::Arc;

/// The literal reply the model must return when no directory company is the
/// primary subject of the text.
pub const NO_MATCH_SENTINEL: &str = "N/A";

pub struct EntityResolver {
    directory: CompanyDirectory,
    model: Arc<dyn TextModel>,
}

impl EntityResolver {
    pub fn new(directory: CompanyDirectory, model: Arc<dyn TextModel>) -> Self {
        Self { directory, model }
    }

    pub fn directory(&self) -> &CompanyDirectory {
        &self.directory
    }

    fn build_prompt(&self, free_text: &str) -> String {
        format!(
            "You are an expert financial entity recognition service. Your sole task is to \
             determine if a piece of financial text is directly and primarily about one of \
             the specific companies from the provided list.\n\
             \n\
             Analyze the following text:\n\
             \"{}\"\n\
             \n\
             Now, consider this specific list of companies:\n\
             {}\n\
             \n\
             Is the text PRIMARILY about one of those companies?\n\
             - If yes, respond with ONLY the official company name from the list that is \
             the main subject.\n\
             - If the text mentions a company but only in a minor context, or if it is \
             about general market trends, or if no company from the list is mentioned, \
             respond with \"{}\".",
            free_text,
            self.directory.display_names().join(", "),
            NO_MATCH_SENTINEL
        )
    }

    /// Resolve free text to a tracked identifier, or None.
    ///
    /// Never fatal to the caller: model failures and missing configuration
    /// log a warning and resolve to no match.
    pub async fn resolve(&self, free_text: &str) -> Option<String> {
        if self.directory.is_empty() {
            tracing::warn!("Entity resolution skipped: company directory is empty");
            return None;
        }

        let prompt = self.build_prompt(free_text);
        let reply = match self.model.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Entity resolution call failed: {}", e);
                return None;
            }
        };

        // Only an exact directory name counts. The sentinel, partial matches
        // and hallucinated names all fall through to None here.
        match self.directory.ticker_for_name(reply.trim()) {
            Some(ticker) => Some(ticker.to_string()),
            None => {
                tracing::debug!("No tracked company resolved from reply {:?}", reply.trim());
                None
            }
        }
    }
}
