//! Chat-completion transports.
//!
//! Every extraction ends in exactly one chat call. The [`ChatTransport`] trait
//! is the seam between the extractors and the network: extractors build a
//! [`ChatRequest`], a transport turns it into a [`ChatReply`]. Two transports
//! exist and are interchangeable:
//!
//! * [`unified::UnifiedTransport`] — edgequake-llm provider for the vendor
//!   families it supports natively.
//! * [`http::HttpTransport`] — raw OpenAI-style POST for anything else.
//!
//! [`TransportRouter`] picks one per request from the
//! [`capability::CapabilityTable`].

pub mod capability;
pub mod http;
pub mod unified;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::output::UsageMetadata;
use async_trait::async_trait;
use capability::{CapabilityTable, TransportKind};
use std::sync::Arc;
use tracing::debug;

/// One part of a user message, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Base64-encoded image payload.
    Image { mime_type: String, data: String },
}

impl ContentPart {
    /// `data:<mime>;base64,<data>` for image parts.
    pub fn data_url(&self) -> Option<String> {
        match self {
            ContentPart::Image { mime_type, data } => Some(format!("data:{mime_type};base64,{data}")),
            ContentPart::Text(_) => None,
        }
    }
}

/// A single-turn chat request: one user message made of ordered parts.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
}

impl ChatRequest {
    /// Text-only request.
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn has_images(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, ContentPart::Image { .. }))
    }

    /// All text parts joined by blank lines.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The unprocessed reply text plus any usage the backend reported.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub usage: Option<UsageMetadata>,
}

/// Sends one chat request and returns the raw reply.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, TransportError>;
}

/// Dispatches each request to the transport its model is mapped to.
pub struct TransportRouter {
    table: CapabilityTable,
    unified: Arc<dyn ChatTransport>,
    http: Arc<dyn ChatTransport>,
}

impl TransportRouter {
    pub fn new(
        table: CapabilityTable,
        unified: Arc<dyn ChatTransport>,
        http: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            table,
            unified,
            http,
        }
    }

    /// Router over the real unified and HTTP transports.
    pub fn from_config(config: Arc<ClientConfig>) -> Result<Self, TransportError> {
        let table = config.capabilities.clone();
        let unified = Arc::new(unified::UnifiedTransport::new(Arc::clone(&config)));
        let http = Arc::new(http::HttpTransport::new(config)?);
        Ok(Self::new(table, unified, http))
    }

    fn pick(&self, model: &str) -> &Arc<dyn ChatTransport> {
        match self.table.resolve(model) {
            TransportKind::Unified => &self.unified,
            TransportKind::Http => &self.http,
        }
    }
}

#[async_trait]
impl ChatTransport for TransportRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, TransportError> {
        let transport = self.pick(&request.model);
        debug!("Model '{}' → {} transport", request.model, transport.name());
        transport.send(request).await
    }
}
