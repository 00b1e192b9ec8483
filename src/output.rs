//! Result payloads returned to callers.
//!
//! The serialized shapes are a contract with downstream consumers (the HTTP
//! shell, evaluation scripts), so field names and `null` handling are fixed:
//!
//! ```json
//! {"structured_data": {...} | {"error": "..."}, "model": "...", "method": "llm", "usage": null}
//! ```
//!
//! and for `both`:
//!
//! ```json
//! {"OCR": {...}, "LLM": {...}}
//! ```

use crate::schema::StructuredInvoice;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend-reported token counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageMetadata {
    /// Usage as reported by a backend, or `None` when it reported nothing.
    ///
    /// All-zero counts mean "not reported". A missing `total` is derived.
    pub fn reported(prompt: u64, completion: u64, total: Option<u64>) -> Option<Self> {
        let total = total.unwrap_or(prompt + completion);
        if prompt == 0 && completion == 0 && total == 0 {
            return None;
        }
        Some(Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: total,
        })
    }
}

/// Which strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// OCR text followed by a text-only model call.
    Ocr,
    /// Page images sent directly to a multimodal model.
    Llm,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Ocr => f.write_str("ocr"),
            Method::Llm => f.write_str("llm"),
        }
    }
}

/// Either the extracted invoice or an `{"error": "..."}` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Failed { error: String },
    Invoice(StructuredInvoice),
}

impl ExtractionOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        ExtractionOutcome::Failed {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExtractionOutcome::Failed { .. })
    }

    pub fn invoice(&self) -> Option<&StructuredInvoice> {
        match self {
            ExtractionOutcome::Invoice(inv) => Some(inv),
            ExtractionOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExtractionOutcome::Failed { error } => Some(error),
            ExtractionOutcome::Invoice(_) => None,
        }
    }
}

/// What one strategy returns: the outcome and, if reported, token usage.
pub type StrategyResult = (ExtractionOutcome, Option<UsageMetadata>);

/// Result of a single-strategy extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleResponse {
    pub structured_data: ExtractionOutcome,
    pub model: String,
    pub method: Method,
    pub usage: Option<UsageMetadata>,
}

/// Result of `both` mode: the two strategies side by side, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResponse {
    #[serde(rename = "OCR")]
    pub ocr: SingleResponse,
    #[serde(rename = "LLM")]
    pub llm: SingleResponse,
}

/// Top-level payload of [`crate::Extractor::extract`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionResponse {
    Combined(CombinedResponse),
    Single(SingleResponse),
}

impl ExtractionResponse {
    /// Every single-strategy response contained in this payload.
    pub fn responses(&self) -> Vec<&SingleResponse> {
        match self {
            ExtractionResponse::Single(r) => vec![r],
            ExtractionResponse::Combined(c) => vec![&c.ocr, &c.llm],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_usage_is_absent() {
        assert_eq!(UsageMetadata::reported(0, 0, None), None);
        assert_eq!(UsageMetadata::reported(0, 0, Some(0)), None);
    }

    #[test]
    fn total_is_derived_when_missing() {
        let u = UsageMetadata::reported(100, 20, None).unwrap();
        assert_eq!(u.total_tokens, 120);
        let u = UsageMetadata::reported(100, 20, Some(125)).unwrap();
        assert_eq!(u.total_tokens, 125);
    }

    #[test]
    fn failed_outcome_serializes_as_error_object() {
        let outcome = ExtractionOutcome::failed("No text to analyze.");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"error": "No text to analyze."})
        );
    }

    #[test]
    fn single_response_shape() {
        let resp = SingleResponse {
            structured_data: ExtractionOutcome::failed("boom"),
            model: "google/gemini-2.5-flash".into(),
            method: Method::Llm,
            usage: None,
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({
                "structured_data": {"error": "boom"},
                "model": "google/gemini-2.5-flash",
                "method": "llm",
                "usage": null
            })
        );
    }

    #[test]
    fn combined_response_has_two_keys() {
        let single = |method| SingleResponse {
            structured_data: ExtractionOutcome::failed("x"),
            model: "m".into(),
            method,
            usage: None,
        };
        let resp = ExtractionResponse::Combined(CombinedResponse {
            ocr: single(Method::Ocr),
            llm: single(Method::Llm),
        });
        let value = serde_json::to_value(&resp).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(value.get("OCR").is_some());
        assert!(value.get("LLM").is_some());
        assert_eq!(resp.responses().len(), 2);
    }

    #[test]
    fn method_display() {
        assert_eq!(Method::Ocr.to_string(), "ocr");
        assert_eq!(Method::Llm.to_string(), "llm");
    }
}
