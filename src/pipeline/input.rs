//! Input resolution: validate a user-supplied path and classify the document.
//!
//! Validation happens once, before any strategy runs, so a missing or
//! unreadable file is reported to the caller as a hard error instead of
//! turning into two contained `{"error": ...}` results in `both` mode.
//!
//! The document kind is sniffed from the `%PDF` magic bytes. The `.pdf`
//! extension is only a fallback so that a damaged PDF is still reported as a
//! corrupt PDF rather than an undecodable image.

use crate::error::ExtractError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the rasteriser and OCR stage should do with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
}

/// A validated local input file.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

/// Validate that `path` exists and is readable, and classify it.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let kind = match detect_kind(path) {
        Ok(kind) => kind,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    debug!("Resolved local {:?}: {}", kind, path.display());
    Ok(ResolvedInput {
        path: path.to_path_buf(),
        kind,
    })
}

/// Classify a file by its leading bytes, falling back to the extension.
pub fn detect_kind(path: &Path) -> std::io::Result<DocumentKind> {
    let mut f = std::fs::File::open(path)?;
    let mut magic = [0u8; 4];
    let n = f.read(&mut magic)?;
    if n == 4 && &magic == b"%PDF" {
        return Ok(DocumentKind::Pdf);
    }
    let is_pdf_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    Ok(if is_pdf_ext {
        DocumentKind::Pdf
    } else {
        DocumentKind::Image
    })
}

/// File suffix to keep when spilling in-memory bytes to disk.
pub fn suffix_for_bytes(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        ".pdf"
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        ".png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ".jpg"
    } else {
        ".bin"
    }
}
