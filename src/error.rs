//! Error types for the invoice-extract library.
//!
//! Errors fall into two tiers:
//!
//! * [`ExtractError`] — **Hard failures** reported to the immediate caller:
//!   unknown mode, missing input file, invalid configuration. These happen
//!   before any extraction work starts.
//!
//! * Stage errors — [`RasterizationError`], [`TransportError`],
//!   [`MalformedResponseError`] and [`OcrError`]. They originate inside an
//!   extractor and are contained there: the extractor converts them to an
//!   `{"error": "..."}` payload (see [`crate::output::ExtractionOutcome`]) so a
//!   batch caller can move past a single failed document.

use std::path::PathBuf;
use thiserror::Error;

/// Hard failures returned by the top-level `extract*` functions.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The caller asked for a mode other than `ocr`, `llm` or `both`.
    #[error("Invalid mode '{mode}': expected one of ocr, llm, both")]
    InvalidMode { mode: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// `true` when the failure was caused by caller input rather than by the
    /// library or its environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExtractError::InvalidMode { .. }
                | ExtractError::FileNotFound { .. }
                | ExtractError::PermissionDenied { .. }
        )
    }
}

/// The document could not be turned into page images.
#[derive(Debug, Error)]
pub enum RasterizationError {
    #[error("Cannot read '{path}': {detail}")]
    FileUnreadable { path: PathBuf, detail: String },

    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    #[error("Unsupported or undecodable image '{path}': {detail}")]
    UnsupportedImage { path: PathBuf, detail: String },

    #[error("Document '{path}' contains no pages")]
    NoPages { path: PathBuf },

    #[error("Rasterisation failed for page {page}: {detail}")]
    PageRender { page: usize, detail: String },

    #[error("JPEG encoding failed for page {page}: {detail}")]
    Encode { page: usize, detail: String },

    #[error("PDFium library unavailable: {0}")]
    PdfiumUnavailable(String),

    #[error("Rasteriser internal error: {0}")]
    Internal(String),
}

/// A remote model call failed before a reply body could be read.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error calling '{url}': {detail}")]
    Network { url: String, detail: String },

    /// Non-2xx response. `body` is kept verbatim for diagnostics.
    #[error("{status} - {body}")]
    Status { status: u16, body: String },

    #[error("Model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 2xx response whose body did not have the chat-completion shape.
    #[error("Unexpected response body: {0}")]
    InvalidResponse(String),

    /// The unified client returned an error for the call.
    #[error("Provider '{provider}' call failed: {detail}")]
    Provider { provider: String, detail: String },

    #[error("LLM provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    #[error("No API key configured; set OPENROUTER_API_KEY or pass one explicitly")]
    MissingCredentials,
}

/// The model reply could not be recovered as JSON, even after repair.
///
/// `content` holds the text that failed to parse (after fence stripping and
/// repair) so it can be logged and inspected later.
#[derive(Debug, Clone, Error)]
#[error("Still invalid JSON after repair: {message}")]
pub struct MalformedResponseError {
    pub message: String,
    pub content: String,
}

/// OCR of a document failed.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine '{engine}' could not be started: {detail}")]
    EngineUnavailable { engine: String, detail: String },

    #[error("OCR engine '{engine}' failed: {detail}")]
    EngineFailed { engine: String, detail: String },

    #[error("Could not prepare page {page} for OCR: {detail}")]
    Render { page: usize, detail: String },

    #[error(transparent)]
    Document(#[from] RasterizationError),
}

/// Any failure inside one extraction strategy.
///
/// Never escapes an extractor: it is rendered into the `error` field of the
/// result payload.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Rasterization(#[from] RasterizationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Malformed(#[from] MalformedResponseError),

    /// Reply was valid JSON but not an invoice-shaped object.
    #[error("Reply is not a JSON object: {0}")]
    Schema(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_mode_display() {
        let e = ExtractError::InvalidMode { mode: "xyz".into() };
        let msg = e.to_string();
        assert!(msg.contains("xyz"), "got: {msg}");
        assert!(e.is_client_error());
    }

    #[test]
    fn internal_is_not_client_error() {
        assert!(!ExtractError::Internal("boom".into()).is_client_error());
        assert!(!ExtractError::InvalidConfig("bad".into()).is_client_error());
    }

    #[test]
    fn status_display_matches_payload_format() {
        let e = TransportError::Status {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(e.to_string(), "429 - rate limited");
    }

    #[test]
    fn timeout_display() {
        let e = TransportError::Timeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn stage_error_is_transparent() {
        let e: StageError = MalformedResponseError {
            message: "EOF while parsing".into(),
            content: "{".into(),
        }
        .into();
        assert!(e.to_string().contains("EOF while parsing"));
    }
}
