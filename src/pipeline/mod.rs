//! Pipeline stages for invoice extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the extractors only compose them.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──▶ render ──▶ encode ─────────────┐
//! input ─────┤   (pdfium)   (JPEG)               ├──▶ transport ──▶ normalize ──▶ schema
//! (validate) └──▶ render ──▶ encode ──▶ ocr ─────┘      (LLM)       (repair)
//!                (300 dpi)   (PNG)    (tesseract)
//! ```
//!
//! 1. [`input`]     — validate the path and sniff PDF vs. image
//! 2. [`render`]    — rasterise pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]    — JPEG-encode pages for the model, PNG for OCR
//! 4. [`ocr`]       — page images → plain text via a local engine
//! 5. [`normalize`] — reply text → JSON, with [`repair`] fixing the usual
//!    model quirks (fences, trailing commas, truncation)

pub mod encode;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod render;
pub mod repair;
