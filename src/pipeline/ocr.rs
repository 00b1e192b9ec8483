//! OCR: document → plain text via a local recognition engine.
//!
//! PDF pages are rendered at [`OcrOptions::dpi`] (300 by default, tesseract's
//! sweet spot for body text), PNG-encoded and recognised one at a time. Every
//! page is processed; there is no cap as with the vision path, because text is
//! cheap to send.
//!
//! [`extract_text`] never fails. A document that cannot be read or recognised
//! produces `""`, which the OCR+LLM extractor reports as "No text to
//! analyze." The cause is logged.

use super::encode::encode_png;
use super::render::stream_pages;
use crate::config::OcrOptions;
use crate::error::OcrError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A local text-recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Recognise the text in one PNG-encoded page image.
    async fn recognize(&self, png: &[u8]) -> Result<String, OcrError>;
}

/// The `tesseract` command-line program.
///
/// The page image is piped on stdin and text read from stdout, so nothing is
/// written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractCli {
    /// Executable name or path. Default: `tesseract` (looked up on `PATH`).
    pub binary: PathBuf,
    /// Language pack(s), e.g. `eng` or `eng+fra`. Default: `eng`.
    pub language: String,
    /// Extra arguments appended after the language, e.g. `--psm 6`.
    pub extra_args: Vec<String>,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, png: &[u8]) -> Result<String, OcrError> {
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| OcrError::EngineUnavailable {
                engine: self.binary.display().to_string(),
                detail: e.to_string(),
            })?;

        let mut stdin = child.stdin.take().ok_or_else(|| OcrError::EngineFailed {
            engine: self.name().to_string(),
            detail: "stdin not captured".to_string(),
        })?;

        // Feed stdin while draining stdout/stderr so neither pipe can fill up.
        let feed = async move {
            stdin.write_all(png).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|e| OcrError::EngineFailed {
            engine: self.name().to_string(),
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineFailed {
                engine: self.name().to_string(),
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        if let Err(e) = fed {
            debug!("tesseract closed stdin early: {}", e);
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Recognise all pages of `path`, joined by `"\n"` in page order and trimmed.
///
/// Returns `""` on any document-level failure.
pub async fn extract_text(path: &Path, engine: &dyn OcrEngine, options: &OcrOptions) -> String {
    match try_extract_text(path, engine, options).await {
        Ok(text) => text,
        Err(e) => {
            warn!("OCR of {} failed: {}", path.display(), e);
            String::new()
        }
    }
}

async fn try_extract_text(
    path: &Path,
    engine: &dyn OcrEngine,
    options: &OcrOptions,
) -> Result<String, OcrError> {
    info!("OCR: {} with {}", path.display(), engine.name());

    // Pages arrive one at a time; an early return drops the receiver and
    // stops the renderer.
    let mut pages = stream_pages(path, options.dpi);
    let mut texts = Vec::new();
    while let Some(rendered) = pages.recv().await {
        let (idx, page) = rendered?;
        let png = tokio::task::spawn_blocking(move || encode_png(&page))
            .await
            .map_err(|e| OcrError::Render {
                page: idx + 1,
                detail: format!("encode task panicked: {}", e),
            })?
            .map_err(|e| OcrError::Render {
                page: idx + 1,
                detail: e.to_string(),
            })?;

        match engine.recognize(&png).await {
            Ok(text) => {
                debug!("OCR page {} → {} chars", idx + 1, text.len());
                texts.push(text.trim_end().to_string());
            }
            // No point trying the remaining pages.
            Err(e @ OcrError::EngineUnavailable { .. }) => return Err(e),
            Err(e) => warn!("OCR page {} skipped: {}", idx + 1, e),
        }
    }

    Ok(texts.join("\n").trim().to_string())
}
