//! Raw OpenAI-style chat-completion client.
//!
//! Used for model ids the unified client has no native mapping for. The
//! request is a single user message; multimodal requests carry ordered
//! `text` / `image_url` parts, text-only requests carry a plain string.

use super::{ChatReply, ChatRequest, ChatTransport, ContentPart};
use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::output::UsageMetadata;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// POSTs to `{base_url}/chat/completions` with a bearer credential.
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Network {
                url: config.completions_url(),
                detail: e.to_string(),
            })?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(TransportError::MissingCredentials)?;
        let url = self.config.completions_url();
        let body = build_body(request, &self.config);

        debug!("POST {} model={}", url, request.model);

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body);
        if let Some(ref referer) = self.config.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(ref title) = self.config.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(e, &url, &self.config))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, &url, &self.config))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let reply = parse_completion(&text)?;
        if let Some(ref usage) = reply.usage {
            info!(
                "{} response: {} tokens (prompt: {}, completion: {})",
                request.model, usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(reply)
    }
}

fn map_reqwest_error(e: reqwest::Error, url: &str, config: &ClientConfig) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout {
            secs: config.timeout.as_secs(),
        }
    } else {
        TransportError::Network {
            url: url.to_string(),
            detail: e.to_string(),
        }
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

fn build_body(request: &ChatRequest, config: &ClientConfig) -> CompletionRequest {
    let content = if request.has_images() {
        MessageContent::Parts(
            request
                .parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => Part::Text { text: text.clone() },
                    ContentPart::Image { .. } => Part::ImageUrl {
                        image_url: ImageUrl {
                            url: part.data_url().unwrap_or_default(),
                        },
                    },
                })
                .collect(),
        )
    } else {
        MessageContent::Text(request.joined_text())
    };

    CompletionRequest {
        model: request.model.clone(),
        messages: vec![Message {
            role: "user",
            content,
        }],
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

/// Pull the reply text and usage out of a chat-completion body.
///
/// `content` may be a string or, for some providers, a list of
/// `{"type": "text", "text": ...}` parts which are concatenated.
pub(crate) fn parse_completion(body: &str) -> Result<ChatReply, TransportError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("{e}: {}", preview(body))))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| TransportError::InvalidResponse(format!("no message content: {}", preview(body))))?;

    let content = match content {
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        other => {
            return Err(TransportError::InvalidResponse(format!(
                "unexpected content type: {other}"
            )))
        }
    };

    let usage = response.usage.and_then(|u| {
        UsageMetadata::reported(
            u.prompt_tokens.unwrap_or(0),
            u.completion_tokens.unwrap_or(0),
            u.total_tokens,
        )
    });

    Ok(ChatReply { content, usage })
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
