//! # invoice-extract
//!
//! Extract structured fields (parties, countries, commodities, transport)
//! from scanned invoices and other trade documents.
//!
//! ## Two strategies
//!
//! Documents arrive as PDFs or photos, often skewed, stamped or low-contrast.
//! The crate offers two ways to read them, so their accuracy and cost can be
//! compared on the same document:
//!
//! - **`llm`**: rasterise up to 5 pages and send them to a multimodal model
//!   that reads the page images directly.
//! - **`ocr`**: transcribe every page with tesseract, then ask a text-only
//!   model to structure the transcription.
//!
//! `both` runs the two one after the other and returns them side by side.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Input      validate path, sniff PDF vs. image
//!  ├─ 2. Render     rasterise via pdfium / decode via image (spawn_blocking)
//!  ├─ 3a. Encode    JPEG q80, ≤2000 px        ──┐
//!  ├─ 3b. OCR       PNG → tesseract → text    ──┤
//!  ├─ 4. Transport  edgequake-llm or raw HTTP ◀─┘
//!  ├─ 5. Normalize  strip fences, repair, parse JSON
//!  └─ 6. Schema     lenient mapping onto StructuredInvoice + usage
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_extract::{ClientConfig, Extractor, ExtractorConfig, Mode, ModelSelection};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENROUTER_API_KEY
//!     let client = Arc::new(ClientConfig::from_env()?);
//!     let extractor = Extractor::new(client, ExtractorConfig::default())?;
//!     let response = extractor
//!         .extract("invoice.pdf", Mode::Both, &ModelSelection::default())
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! invoice-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod extractor;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod schema;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ClientConfig, ClientConfigBuilder, ExtractorConfig, OcrOptions, RasterOptions};
pub use error::{
    ExtractError, MalformedResponseError, OcrError, RasterizationError, StageError,
    TransportError,
};
pub use extract::{Extractor, Mode, ModelSelection};
pub use extractor::{ExtractionStrategy, OcrTextExtractor, VisionExtractor};
pub use output::{
    CombinedResponse, ExtractionOutcome, ExtractionResponse, Method, SingleResponse,
    StrategyResult, UsageMetadata,
};
pub use pipeline::encode::PageImage;
pub use pipeline::normalize::normalize_reply;
pub use pipeline::ocr::{OcrEngine, TesseractCli};
pub use pipeline::render::rasterize;
pub use schema::StructuredInvoice;
pub use transport::capability::{CapabilityTable, TransportKind};
pub use transport::{ChatReply, ChatRequest, ChatTransport, ContentPart, TransportRouter};
