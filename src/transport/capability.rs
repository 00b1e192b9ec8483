//! Per-model transport selection.
//!
//! Model identifiers from different vendors need different request paths:
//! families the unified client knows (`gpt`, `claude`, `gemini`, ...) go
//! through edgequake-llm, everything else is posted as raw JSON to the
//! chat-completion endpoint. The table is plain data, so a JSON file can add
//! or override models without a rebuild.
//!
//! ```json
//! {
//!   "exact": { "qwen/qwen-2.5-vl-7b-instruct": "http" },
//!   "keywords": [["gpt", "unified"], ["claude", "unified"]],
//!   "fallback": "http"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Which client carries the request for a given model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// edgequake-llm provider (`ProviderFactory`).
    Unified,
    /// Raw reqwest POST to `{base_url}/chat/completions`.
    Http,
}

/// Vendor name fragments routed through the unified client by default.
pub const DEFAULT_UNIFIED_KEYWORDS: &[&str] = &["gpt", "claude", "gemini", "llama", "mistral"];

/// Model id → [`TransportKind`] mapping.
///
/// Resolution order: exact id, then the first keyword contained in the
/// lower-cased id, then `fallback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityTable {
    pub exact: HashMap<String, TransportKind>,
    pub keywords: Vec<(String, TransportKind)>,
    pub fallback: TransportKind,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            keywords: DEFAULT_UNIFIED_KEYWORDS
                .iter()
                .map(|k| (k.to_string(), TransportKind::Unified))
                .collect(),
            fallback: TransportKind::Http,
        }
    }
}

impl CapabilityTable {
    /// Pick the transport for `model`.
    pub fn resolve(&self, model: &str) -> TransportKind {
        if let Some(kind) = self.exact.get(model) {
            return *kind;
        }
        let lowered = model.to_lowercase();
        self.keywords
            .iter()
            .find(|(keyword, _)| lowered.contains(&keyword.to_lowercase()))
            .map(|(_, kind)| *kind)
            .unwrap_or(self.fallback)
    }

    /// Pin a single model id to a transport.
    pub fn with_model(mut self, model: impl Into<String>, kind: TransportKind) -> Self {
        self.exact.insert(model.into(), kind);
        self
    }

    /// Parse a table from JSON. Missing sections keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a table from a JSON file.
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
