//! Unified chat client backed by edgequake-llm.
//!
//! The provider is resolved per request because the model id is part of the
//! request, not the configuration:
//!
//! 1. **Pre-built provider** (`ClientConfig::provider`) — used as-is. Useful in
//!    tests or when the caller needs custom middleware.
//! 2. **OpenRouter with an injected key** (`provider_name == "openrouter"` and
//!    `ClientConfig::api_key` set) — an [`OpenRouterProvider`] built from the
//!    config's key, base URL and attribution headers.
//! 3. **Named provider** (`ClientConfig::provider_name`) — created with
//!    [`ProviderFactory::create_llm_provider`] for the request's model. The
//!    factory reads the provider's own API key variable.

use super::{ChatReply, ChatRequest, ChatTransport, ContentPart};
use crate::config::{ClientConfig, DEFAULT_PROVIDER};
use crate::error::TransportError;
use crate::output::UsageMetadata;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, OpenRouterProvider, ProviderFactory,
};
use std::sync::Arc;
use tracing::debug;

pub struct UnifiedTransport {
    config: Arc<ClientConfig>,
}

impl UnifiedTransport {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    fn resolve_provider(&self, model: &str) -> Result<Arc<dyn LLMProvider>, TransportError> {
        if let Some(ref provider) = self.config.provider {
            return Ok(Arc::clone(provider));
        }
        let name = &self.config.provider_name;
        if name.eq_ignore_ascii_case(DEFAULT_PROVIDER) {
            if let Some(key) = self.config.api_key.as_deref() {
                return Ok(Arc::new(self.openrouter(key, model)));
            }
        }
        ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            TransportError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })
    }

    fn openrouter(&self, key: &str, model: &str) -> OpenRouterProvider {
        let mut provider = OpenRouterProvider::new(key)
            .with_base_url(self.config.base_url.trim_end_matches('/'))
            .with_model(model);
        if let Some(ref referer) = self.config.referer {
            provider = provider.with_site_url(referer);
        }
        if let Some(ref title) = self.config.title {
            provider = provider.with_site_name(title);
        }
        provider
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            ..Default::default()
        }
    }
}

/// Build the single user message: text first, then images in page order.
fn build_message(request: &ChatRequest) -> ChatMessage {
    let text = request.joined_text();
    let images = collect_images(request);

    if images.is_empty() {
        ChatMessage::user(text)
    } else {
        ChatMessage::user_with_images(text, images)
    }
}

/// `detail: "high"` keeps fine print (HS codes, vessel numbers) legible to
/// GPT-class models, which otherwise downsample to one 512 px tile.
fn collect_images(request: &ChatRequest) -> Vec<ImageData> {
    request
        .parts
        .iter()
        .filter_map(|part| match part {
            ContentPart::Image { mime_type, data } => {
                Some(ImageData::new(data.clone(), mime_type.clone()).with_detail("high"))
            }
            ContentPart::Text(_) => None,
        })
        .collect()
}

#[async_trait]
impl ChatTransport for UnifiedTransport {
    fn name(&self) -> &str {
        "unified"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        let provider = self.resolve_provider(&request.model)?;
        let messages = vec![build_message(request)];
        let options = self.build_options();
        let timeout = self.config.timeout;

        let response = tokio::time::timeout(timeout, provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| TransportError::Timeout {
                secs: timeout.as_secs(),
            })?
            .map_err(|e| TransportError::Provider {
                provider: self.config.provider_name.clone(),
                detail: format!("{e}"),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            request.model, response.prompt_tokens, response.completion_tokens
        );

        let usage = UsageMetadata::reported(
            response.prompt_tokens as u64,
            response.completion_tokens as u64,
            None,
        );

        Ok(ChatReply {
            content: response.content,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_forwards_config() {
        let config = ClientConfig::builder()
            .temperature(0.0)
            .max_tokens(4096)
            .build()
            .unwrap();
        let transport = UnifiedTransport::new(Arc::new(config));
        let opts = transport.build_options();
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn build_options_defaults_leave_provider_defaults() {
        let transport = UnifiedTransport::new(Arc::new(ClientConfig::default()));
        let opts = transport.build_options();
        assert_eq!(opts.temperature, None);
        assert_eq!(opts.max_tokens, None);
    }

    #[test]
    fn injected_key_builds_openrouter_provider() {
        let config = ClientConfig::builder()
            .api_key("sk-or-injected")
            .base_url("http://127.0.0.1:9/api/v1/")
            .build()
            .unwrap();
        let transport = UnifiedTransport::new(Arc::new(config));
        let provider = transport.resolve_provider("google/gemini-2.5-flash").unwrap();
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(provider.model(), "google/gemini-2.5-flash");
    }

    #[test]
    fn images_collected_in_page_order() {
        let request = ChatRequest {
            model: "google/gemini-2.5-flash".into(),
            parts: vec![
                ContentPart::Text("extract".into()),
                ContentPart::Image {
                    mime_type: "image/jpeg".into(),
                    data: "AAAA".into(),
                },
                ContentPart::Image {
                    mime_type: "image/jpeg".into(),
                    data: "BBBB".into(),
                },
            ],
        };
        let images = collect_images(&request);
        assert_eq!(images.len(), 2);
        assert!(collect_images(&ChatRequest::text("m", "only text")).is_empty());
    }
}
