//! The two extraction strategies.
//!
//! Both send the same [`EXTRACTION_PROMPT`] and differ only in the evidence:
//!
//! | Strategy             | Evidence                     | Message            |
//! |----------------------|------------------------------|--------------------|
//! | [`VisionExtractor`]  | up to 5 JPEG page images     | text + image parts |
//! | [`OcrTextExtractor`] | tesseract transcription      | text only          |
//!
//! A strategy never returns an error. Anything that goes wrong after input
//! validation (rasterisation, network, a reply that will not parse) becomes
//! an `{"error": "..."}` outcome with no usage, so one failing strategy in
//! `both` mode cannot hide the other's result.

use crate::config::{OcrOptions, RasterOptions};
use crate::error::StageError;
use crate::output::{ExtractionOutcome, Method, StrategyResult, UsageMetadata};
use crate::pipeline::ocr::{extract_text, OcrEngine};
use crate::pipeline::{normalize, render};
use crate::prompts::{ocr_prompt, EXTRACTION_PROMPT};
use crate::schema::StructuredInvoice;
use crate::transport::{ChatRequest, ChatTransport, ContentPart};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Error text for a document in which OCR found nothing.
pub const NO_TEXT_ERROR: &str = "No text to analyze.";

/// One way of turning a document into a [`StructuredInvoice`].
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn method(&self) -> Method;

    /// Extract fields from the document at `path` using `model`.
    ///
    /// Failures are reported in the outcome, never as a panic or error.
    async fn extract(&self, path: &Path, model: &str) -> StrategyResult;
}

/// Sends rasterised pages straight to a multimodal model.
pub struct VisionExtractor {
    transport: Arc<dyn ChatTransport>,
    raster: RasterOptions,
}

impl VisionExtractor {
    pub fn new(transport: Arc<dyn ChatTransport>, raster: RasterOptions) -> Self {
        Self { transport, raster }
    }

    async fn run(
        &self,
        path: &Path,
        model: &str,
    ) -> Result<(StructuredInvoice, Option<UsageMetadata>), StageError> {
        let render_start = Instant::now();
        let pages = render::rasterize(path, &self.raster).await?;
        info!(
            "Rasterised {} page(s) in {}ms",
            pages.len(),
            render_start.elapsed().as_millis()
        );

        let mut parts = Vec::with_capacity(pages.len() + 1);
        parts.push(ContentPart::Text(EXTRACTION_PROMPT.to_string()));
        parts.extend(pages.iter().map(|p| p.to_content_part()));
        debug!(
            "Vision request: {} image bytes",
            pages.iter().map(|p| p.bytes.len()).sum::<usize>()
        );

        let request = ChatRequest {
            model: model.to_string(),
            parts,
        };
        complete(self.transport.as_ref(), &request).await
    }
}

#[async_trait]
impl ExtractionStrategy for VisionExtractor {
    fn method(&self) -> Method {
        Method::Llm
    }

    async fn extract(&self, path: &Path, model: &str) -> StrategyResult {
        contain(self.method(), model, self.run(path, model).await)
    }
}

/// Transcribes the document with OCR, then structures the text with a
/// text-only model.
pub struct OcrTextExtractor {
    transport: Arc<dyn ChatTransport>,
    engine: Arc<dyn OcrEngine>,
    ocr: OcrOptions,
}

impl OcrTextExtractor {
    pub fn new(transport: Arc<dyn ChatTransport>, engine: Arc<dyn OcrEngine>, ocr: OcrOptions) -> Self {
        Self {
            transport,
            engine,
            ocr,
        }
    }
}

#[async_trait]
impl ExtractionStrategy for OcrTextExtractor {
    fn method(&self) -> Method {
        Method::Ocr
    }

    async fn extract(&self, path: &Path, model: &str) -> StrategyResult {
        let ocr_start = Instant::now();
        let text = extract_text(path, self.engine.as_ref(), &self.ocr).await;
        info!(
            "OCR produced {} chars in {}ms",
            text.len(),
            ocr_start.elapsed().as_millis()
        );

        if text.is_empty() {
            warn!("No OCR text for {}; skipping model call", path.display());
            return (ExtractionOutcome::failed(NO_TEXT_ERROR), None);
        }

        let request = ChatRequest::text(model, ocr_prompt(&text));
        contain(
            self.method(),
            model,
            complete(self.transport.as_ref(), &request).await,
        )
    }
}

/// Send the request and turn the reply into an invoice.
async fn complete(
    transport: &dyn ChatTransport,
    request: &ChatRequest,
) -> Result<(StructuredInvoice, Option<UsageMetadata>), StageError> {
    let llm_start = Instant::now();
    let reply = transport.send(request).await?;
    info!(
        "{} replied in {}ms ({} chars)",
        request.model,
        llm_start.elapsed().as_millis(),
        reply.content.len()
    );

    let value = normalize::normalize_reply(&reply.content)?;
    let invoice = StructuredInvoice::from_value(&value).map_err(StageError::Schema)?;
    Ok((invoice, reply.usage))
}

fn contain(
    method: Method,
    model: &str,
    result: Result<(StructuredInvoice, Option<UsageMetadata>), StageError>,
) -> StrategyResult {
    match result {
        Ok((invoice, usage)) => (ExtractionOutcome::Invoice(invoice), usage),
        Err(e) => {
            warn!("{} extraction with '{}' failed: {}", method, model, e);
            (ExtractionOutcome::failed(e.to_string()), None)
        }
    }
}
