use intel_core::IntelError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// The closed mapping of identifier -> canonical display name.
///
/// Only identifiers present here are ever resolvable. Lookup is case-folded;
/// when two entries normalize to the same name, the entry whose ticker sorts
/// first wins (deterministic tie-break, known limitation).
#[derive(Debug, Clone)]
pub struct CompanyDirectory {
    names: BTreeMap<String, String>,
    reverse: HashMap<String, String>,
}

impl CompanyDirectory {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        let mut reverse: HashMap<String, String> = HashMap::new();
        for (ticker, name) in &entries {
            let key = name.trim().to_lowercase();
            if let Some(existing) = reverse.get(&key) {
                tracing::warn!(
                    "Directory name {:?} maps to both {} and {}; keeping {}",
                    name,
                    existing,
                    ticker,
                    existing
                );
                continue;
            }
            reverse.insert(key, ticker.clone());
        }
        Self {
            names: entries,
            reverse,
        }
    }

    /// Load the directory from a JSON file of `{"TICKER": "Display Name"}`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntelError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            IntelError::ConfigError(format!(
                "cannot read company directory {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| IntelError::ConfigError(format!("bad company directory: {}", e)))?;
        Ok(Self::new(entries))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Canonical display names in stable (ticker-sorted) order.
    pub fn display_names(&self) -> Vec<&str> {
        self.names.values().map(|s| s.as_str()).collect()
    }

    /// Case-folded exact lookup of a display name. Anything that is not an
    /// exact directory name resolves to None.
    pub fn ticker_for_name(&self, name: &str) -> Option<&str> {
        self.reverse
            .get(&name.trim().to_lowercase())
            .map(|s| s.as_str())
    }

    pub fn contains_ticker(&self, ticker: &str) -> bool {
        self.names.contains_key(ticker)
    }
}
