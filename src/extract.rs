//! Extraction entry points.
//!
//! [`Extractor`] validates the request, runs the selected strategy (or both,
//! OCR first) and assembles the response payload. Hard errors are limited to
//! what the caller got wrong: an unknown mode, a missing or unreadable file,
//! invalid configuration. Everything else ends up inside the payload.

use crate::config::{ClientConfig, ExtractorConfig, DEFAULT_MODEL};
use crate::error::ExtractError;
use crate::extractor::{ExtractionStrategy, OcrTextExtractor, VisionExtractor};
use crate::output::{CombinedResponse, ExtractionResponse, SingleResponse};
use crate::pipeline::input;
use crate::pipeline::ocr::OcrEngine;
use crate::transport::{ChatTransport, TransportRouter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Which strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// OCR transcription, then a text-only model call.
    Ocr,
    /// Page images sent to a multimodal model.
    Llm,
    /// Both of the above, reported side by side.
    Both,
}

impl FromStr for Mode {
    type Err = ExtractError;

    /// Accepts `ocr`, `llm` or `both`, ignoring case and surrounding space.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ocr" => Ok(Mode::Ocr),
            "llm" => Ok(Mode::Llm),
            "both" => Ok(Mode::Both),
            _ => Err(ExtractError::InvalidMode {
                mode: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Ocr => "ocr",
            Mode::Llm => "llm",
            Mode::Both => "both",
        })
    }
}

/// Model ids for each strategy. They may differ so the two can be priced
/// separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSelection {
    /// Text model that structures OCR output.
    pub ocr_model: String,
    /// Multimodal model that reads page images.
    pub llm_model: String,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::uniform(DEFAULT_MODEL)
    }
}

impl ModelSelection {
    /// The same model for both strategies.
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            ocr_model: model.clone(),
            llm_model: model,
        }
    }
}

/// Runs extractions. Cheap to share behind an `Arc`; holds no mutable state.
pub struct Extractor {
    vision: Arc<dyn ExtractionStrategy>,
    ocr: Arc<dyn ExtractionStrategy>,
}

impl Extractor {
    /// Build the standard extractor: both strategies over a transport router
    /// and the configured tesseract binary.
    pub fn new(client: Arc<ClientConfig>, config: ExtractorConfig) -> Result<Self, ExtractError> {
        let router = TransportRouter::from_config(client)
            .map_err(|e| ExtractError::InvalidConfig(e.to_string()))?;
        let engine = Arc::new(config.tesseract.clone());
        Self::with_transport(Arc::new(router), engine, config)
    }

    /// Build over a caller-supplied transport and OCR engine.
    pub fn with_transport(
        transport: Arc<dyn ChatTransport>,
        engine: Arc<dyn OcrEngine>,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractError> {
        config.validate()?;
        Ok(Self::with_strategies(
            Arc::new(VisionExtractor::new(Arc::clone(&transport), config.raster)),
            Arc::new(OcrTextExtractor::new(transport, engine, config.ocr)),
        ))
    }

    /// Build from arbitrary strategies.
    pub fn with_strategies(
        vision: Arc<dyn ExtractionStrategy>,
        ocr: Arc<dyn ExtractionStrategy>,
    ) -> Self {
        Self { vision, ocr }
    }

    /// Extract invoice fields from the file at `path`.
    ///
    /// # Errors
    /// Only for an unusable request ([`ExtractError::FileNotFound`],
    /// [`ExtractError::PermissionDenied`]). Strategy failures are reported in
    /// the response.
    pub async fn extract(
        &self,
        path: impl AsRef<Path>,
        mode: Mode,
        models: &ModelSelection,
    ) -> Result<ExtractionResponse, ExtractError> {
        let start = Instant::now();
        let resolved = input::resolve_local(path.as_ref())?;
        info!(
            "Starting {} extraction: {} ({:?})",
            mode,
            resolved.path.display(),
            resolved.kind
        );

        let response = match mode {
            Mode::Ocr => ExtractionResponse::Single(
                run(self.ocr.as_ref(), &resolved.path, &models.ocr_model).await,
            ),
            Mode::Llm => ExtractionResponse::Single(
                run(self.vision.as_ref(), &resolved.path, &models.llm_model).await,
            ),
            Mode::Both => {
                let ocr = run(self.ocr.as_ref(), &resolved.path, &models.ocr_model).await;
                let llm = run(self.vision.as_ref(), &resolved.path, &models.llm_model).await;
                ExtractionResponse::Combined(CombinedResponse { ocr, llm })
            }
        };

        let failed = response
            .responses()
            .iter()
            .filter(|r| r.structured_data.is_error())
            .count();
        info!(
            "Extraction complete: {} result(s), {} failed, {}ms",
            response.responses().len(),
            failed,
            start.elapsed().as_millis()
        );
        Ok(response)
    }

    /// Like [`extract`](Self::extract), parsing `mode` first so an unknown
    /// mode is rejected before any work is done.
    pub async fn extract_str(
        &self,
        path: impl AsRef<Path>,
        mode: &str,
        models: &ModelSelection,
    ) -> Result<ExtractionResponse, ExtractError> {
        let mode: Mode = mode.parse()?;
        self.extract(path, mode, models).await
    }

    /// Extract from a document held in memory (an upload, a database blob).
    ///
    /// The bytes are spilled to a temporary file that is removed on return.
    pub async fn extract_from_bytes(
        &self,
        bytes: &[u8],
        mode: Mode,
        models: &ModelSelection,
    ) -> Result<ExtractionResponse, ExtractError> {
        let mut tmp = tempfile::Builder::new()
            .prefix("invoice-")
            .suffix(input::suffix_for_bytes(bytes))
            .tempfile()
            .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
        // `tmp` is dropped (and the file deleted) when `extract` returns
        self.extract(tmp.path(), mode, models).await
    }

    /// Synchronous wrapper around [`extract`](Self::extract).
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn extract_sync(
        &self,
        path: impl AsRef<Path>,
        mode: Mode,
        models: &ModelSelection,
    ) -> Result<ExtractionResponse, ExtractError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.extract(path, mode, models))
    }
}

async fn run(strategy: &dyn ExtractionStrategy, path: &Path, model: &str) -> SingleResponse {
    let (structured_data, usage) = strategy.extract(path, model).await;
    SingleResponse {
        structured_data,
        model: model.to_string(),
        method: strategy.method(),
        usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!("ocr".parse::<Mode>().unwrap(), Mode::Ocr);
        assert_eq!(" LLM ".parse::<Mode>().unwrap(), Mode::Llm);
        assert_eq!("Both".parse::<Mode>().unwrap(), Mode::Both);
    }

    #[test]
    fn unknown_mode_is_client_error() {
        let err = "xyz".parse::<Mode>().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidMode { ref mode } if mode == "xyz"));
        assert!(err.is_client_error());
        assert!("".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_display_round_trips() {
        for mode in [Mode::Ocr, Mode::Llm, Mode::Both] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn default_models() {
        let m = ModelSelection::default();
        assert_eq!(m.ocr_model, "google/gemini-2.5-flash");
        assert_eq!(m.llm_model, "google/gemini-2.5-flash");
    }

    #[test]
    fn invalid_extractor_config_is_rejected() {
        let mut config = ExtractorConfig::default();
        config.raster.max_pages = 0;
        let err = Extractor::new(Arc::new(ClientConfig::default()), config).err();
        assert!(matches!(err, Some(ExtractError::InvalidConfig(_))));
    }
}
