//! Document rasterisation: PDF pages or a single image → `DynamicImage`s.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Decoding a large scan with `image` is likewise CPU-bound. Both run on the
//! blocking pool so Tokio worker threads never stall.
//!
//! ## Scale, then cap
//!
//! PDF pages render at `dpi / 72` (PDF user space is 72 units per inch).
//! An oversized page (A0 drawing, mis-set media box) is additionally capped at
//! [`MAX_RENDER_EDGE`] pixels so memory stays bounded before the encoder
//! downscales it to the model's budget.

use super::encode::{encode_page, PageImage};
use super::input::{detect_kind, DocumentKind};
use crate::config::RasterOptions;
use crate::error::RasterizationError;
use image::{DynamicImage, ImageReader};
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Hard limit on either edge of a rendered PDF page, in pixels.
pub const MAX_RENDER_EDGE: i32 = 10_000;

// Binding twice in one process fails, so the library is bound once.
static PDFIUM: OnceCell<Pdfium> = OnceCell::new();

/// Rasterise up to `options.max_pages` pages of `path` into encoded JPEG
/// pages, in document order.
///
/// Images yield exactly one page with index 0. Pages beyond the cap are
/// ignored.
pub async fn rasterize(
    path: &Path,
    options: &RasterOptions,
) -> Result<Vec<PageImage>, RasterizationError> {
    let path = path.to_path_buf();
    let options = *options;

    tokio::task::spawn_blocking(move || {
        let mut pages = Vec::new();
        for_each_page_blocking(&path, options.dpi, Some(options.max_pages), |idx, img| {
            let page = encode_page(idx, &img, options.max_dimension, options.jpeg_quality)
                .map_err(|e| RasterizationError::Encode {
                    page: idx + 1,
                    detail: e.to_string(),
                })?;
            pages.push(page);
            Ok(true)
        })?;
        Ok(pages)
    })
    .await
    .map_err(|e| RasterizationError::Internal(format!("Render task panicked: {}", e)))?
}

/// One full-resolution page: its 0-based index and pixels.
pub type RenderedPage = Result<(usize, DynamicImage), RasterizationError>;

/// Render every page of `path` at `dpi`, one at a time, without a cap.
///
/// Pages are produced on the blocking pool and handed over through a channel
/// of capacity one, so at most three pages are held in memory: the one being
/// consumed, one queued and one being rendered. A document-level failure arrives as the last item. Dropping the
/// receiver stops rendering after the current page.
pub fn stream_pages(path: &Path, dpi: u32) -> mpsc::Receiver<RenderedPage> {
    let path = path.to_path_buf();
    let (tx, rx) = mpsc::channel(1);

    tokio::task::spawn_blocking(move || {
        let rendered = for_each_page_blocking(&path, dpi, None, |idx, img| {
            Ok(tx.blocking_send(Ok((idx, img))).is_ok())
        });
        if let Err(e) = rendered {
            tx.blocking_send(Err(e)).ok();
        }
    });

    rx
}

/// Blocking page loop shared by both entry points. `sink` returns `false` to
/// stop early.
fn for_each_page_blocking<F>(
    path: &Path,
    dpi: u32,
    max_pages: Option<usize>,
    mut sink: F,
) -> Result<(), RasterizationError>
where
    F: FnMut(usize, DynamicImage) -> Result<bool, RasterizationError>,
{
    let kind = detect_kind(path).map_err(|e| RasterizationError::FileUnreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    match kind {
        DocumentKind::Pdf => render_pdf_blocking(path, dpi, max_pages, sink),
        DocumentKind::Image => sink(0, decode_image_blocking(path)?).map(|_| ()),
    }
}

fn render_pdf_blocking<F>(
    path: &Path,
    dpi: u32,
    max_pages: Option<usize>,
    mut sink: F,
) -> Result<(), RasterizationError>
where
    F: FnMut(usize, DynamicImage) -> Result<bool, RasterizationError>,
{
    let document = pdfium()?
        .load_pdf_from_file(path, None)
        .map_err(|e| classify_load_error(path, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    if total_pages == 0 {
        return Err(RasterizationError::NoPages {
            path: path.to_path_buf(),
        });
    }

    let limit = max_pages.unwrap_or(total_pages).min(total_pages);
    if limit < total_pages {
        debug!(
            "Rendering first {} of {} pages; the rest are ignored",
            limit, total_pages
        );
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(MAX_RENDER_EDGE)
        .set_maximum_height(MAX_RENDER_EDGE);

    for (idx, page) in pages.iter().enumerate().take(limit) {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RasterizationError::PageRender {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        if !sink(idx, image)? {
            debug!("Page consumer gone; stopping after page {}", idx + 1);
            break;
        }
    }

    Ok(())
}

/// The process-wide pdfium binding, created on first use.
fn pdfium() -> Result<&'static Pdfium, RasterizationError> {
    PDFIUM
        .get_or_try_init(pdfium_auto::bind_pdfium_silent)
        .map_err(|e| RasterizationError::PdfiumUnavailable(e.to_string()))
}

fn classify_load_error(path: &Path, e: PdfiumError) -> RasterizationError {
    let path: PathBuf = path.to_path_buf();
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        RasterizationError::PasswordRequired { path }
    } else {
        RasterizationError::CorruptPdf {
            path,
            detail: err_str,
        }
    }
}

fn decode_image_blocking(path: &Path) -> Result<DynamicImage, RasterizationError> {
    let reader = ImageReader::open(path)
        .map_err(|e| RasterizationError::FileUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?
        .with_guessed_format()
        .map_err(|e| RasterizationError::FileUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let image = reader
        .decode()
        .map_err(|e| RasterizationError::UnsupportedImage {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    debug!(
        "Decoded image {} → {}x{} px",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}
