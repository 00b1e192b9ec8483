//! Image encoding: `DynamicImage` → JPEG (for the model) or PNG (for OCR).
//!
//! Page images go to the model as base64 data inside the JSON request body,
//! so size matters more here than in OCR. Pages are downscaled to fit a
//! bounding box (never upscaled), flattened to RGB and encoded as JPEG.
//! Quality 80 keeps printed text sharp while a full A4 page at 200 DPI stays
//! well under 1 MB.
//!
//! OCR gets lossless PNG: tesseract is sensitive to compression artefacts
//! around glyph edges.

use crate::transport::ContentPart;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// One rasterised, encoded page ready for a multimodal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 0-based page index within the source document.
    pub page_index: usize,
    /// Encoded JPEG bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:image/jpeg;base64,...`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }

    /// Request part carrying this page.
    pub fn to_content_part(&self) -> ContentPart {
        ContentPart::Image {
            mime_type: self.mime_type().to_string(),
            data: self.to_base64(),
        }
    }
}

/// Downscale `img` to fit `max_dimension` on its longest edge and encode it
/// as an RGB JPEG.
///
/// Aspect ratio is preserved. Images already within bounds keep their size.
pub fn encode_page(
    page_index: usize,
    img: &DynamicImage,
    max_dimension: u32,
    quality: u8,
) -> Result<PageImage, image::ImageError> {
    let img = downscale(img, max_dimension);
    let rgb = img.to_rgb8();

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    rgb.write_with_encoder(encoder)?;

    debug!(
        "Encoded page {} → {}x{} px, {} bytes JPEG",
        page_index + 1,
        rgb.width(),
        rgb.height(),
        bytes.len()
    );

    Ok(PageImage {
        page_index,
        bytes,
        width: rgb.width(),
        height: rgb.height(),
    })
}

/// Encode `img` as PNG, unchanged in size.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

fn downscale(img: &DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width() <= max_dimension && img.height() <= max_dimension {
        return img.clone();
    }
    img.thumbnail(max_dimension, max_dimension)
}
