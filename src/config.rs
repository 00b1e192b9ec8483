//! Configuration types for invoice extraction.
//!
//! Two structs split the knobs by lifecycle:
//!
//! * [`ClientConfig`] — credentials, endpoint, timeout and the per-model
//!   transport [`CapabilityTable`]. Built once at process start (via
//!   [`ClientConfig::builder`] or [`ClientConfig::from_env`]), wrapped in an
//!   `Arc`, and treated as read-only by every extractor.
//! * [`ExtractorConfig`] — rasterisation and OCR tuning that only affects how
//!   documents are turned into model input.

use crate::error::ExtractError;
use crate::pipeline::ocr::TesseractCli;
use crate::transport::capability::CapabilityTable;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default model for both the OCR-stage and the LLM-stage call.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Default chat-completion endpoint root (OpenRouter).
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default edgequake-llm provider used by the unified transport.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// Connection settings shared by every remote model call.
///
/// # Example
/// ```rust
/// use invoice_extract::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .api_key("sk-or-test")
///     .timeout(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout.as_secs(), 30);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer credential for the raw HTTP transport.
    pub api_key: Option<String>,

    /// Endpoint root; `/chat/completions` is appended. Default: OpenRouter.
    pub base_url: String,

    /// edgequake-llm provider name for the unified transport. Default: `openrouter`.
    pub provider_name: String,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Upper bound on a single model call. Default: 120 s.
    pub timeout: Duration,

    /// Sampling temperature forwarded to the model, if set.
    pub temperature: Option<f32>,

    /// Completion token cap forwarded to the model, if set.
    pub max_tokens: Option<usize>,

    /// Optional `HTTP-Referer` attribution header (OpenRouter app ranking).
    pub referer: Option<String>,

    /// Optional `X-Title` attribution header (OpenRouter app ranking).
    pub title: Option<String>,

    /// Model id → transport mapping.
    pub capabilities: CapabilityTable,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            provider_name: DEFAULT_PROVIDER.to_string(),
            provider: None,
            timeout: Duration::from_secs(120),
            temperature: None,
            max_tokens: None,
            referer: None,
            title: None,
            capabilities: CapabilityTable::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("referer", &self.referer)
            .field("title", &self.title)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read connection settings from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `OPENROUTER_API_KEY` | `api_key` |
    /// | `INVOICE_EXTRACT_BASE_URL` | `base_url` |
    /// | `INVOICE_EXTRACT_PROVIDER` | `provider_name` |
    ///
    /// Unset or empty variables keep the defaults. Call this once at startup.
    /// With `api_key` set, extraction never reads the environment again; only
    /// a non-OpenRouter provider without an injected key falls back to its own
    /// variable.
    pub fn from_env() -> Result<Self, ExtractError> {
        let mut builder = Self::builder();
        if let Some(key) = non_empty_env("OPENROUTER_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Some(url) = non_empty_env("INVOICE_EXTRACT_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(name) = non_empty_env("INVOICE_EXTRACT_PROVIDER") {
            builder = builder.provider_name(name);
        }
        builder.build()
    }

    /// Full URL of the chat-completion endpoint.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.config.referer = Some(referer.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn capabilities(mut self, table: CapabilityTable) -> Self {
        self.config.capabilities = table;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ExtractError> {
        let c = &self.config;
        if c.timeout.is_zero() {
            return Err(ExtractError::InvalidConfig(
                "Timeout must be greater than zero".into(),
            ));
        }
        if c.base_url.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("Base URL must not be empty".into()));
        }
        if c.provider_name.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "Provider name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Page rasterisation settings for the multimodal strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterOptions {
    /// Maximum number of pages sent to the model. Default: 5.
    ///
    /// Later pages are ignored, bounding cost and latency per document.
    pub max_pages: usize,

    /// Rendering resolution for PDF pages. Default: 200.
    pub dpi: u32,

    /// Longest permitted edge in pixels after downscaling. Default: 2000.
    pub max_dimension: u32,

    /// JPEG quality (1–100). Default: 80.
    pub jpeg_quality: u8,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            max_pages: 5,
            dpi: 200,
            max_dimension: 2000,
            jpeg_quality: 80,
        }
    }
}

impl RasterOptions {
    fn validate(&self) -> Result<(), ExtractError> {
        if self.max_pages == 0 {
            return Err(ExtractError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if !(72..=600).contains(&self.dpi) {
            return Err(ExtractError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                self.dpi
            )));
        }
        if self.max_dimension < 100 {
            return Err(ExtractError::InvalidConfig(format!(
                "max_dimension must be ≥ 100, got {}",
                self.max_dimension
            )));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ExtractError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// OCR rendering settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Rendering resolution for PDF pages before recognition. Default: 300.
    pub dpi: u32,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self { dpi: 300 }
    }
}

/// Document-preparation settings for both strategies.
#[derive(Debug, Clone, Default)]
pub struct ExtractorConfig {
    pub raster: RasterOptions,
    pub ocr: OcrOptions,
    pub tesseract: TesseractCli,
}

impl ExtractorConfig {
    /// Check every nested option group.
    pub fn validate(&self) -> Result<(), ExtractError> {
        self.raster.validate()?;
        if !(72..=600).contains(&self.ocr.dpi) {
            return Err(ExtractError::InvalidConfig(format!(
                "OCR DPI must be 72–600, got {}",
                self.ocr.dpi
            )));
        }
        Ok(())
    }
}
