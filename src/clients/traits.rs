use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One address in the provider's `to` list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Request body accepted by the delivery provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryPayload {
    pub from: String,
    pub to: Vec<Address>,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeliveryError {
    /// Provider answered with a non-success status
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// Request never produced a readable response
    #[error("{0}")]
    Transport(String),
}

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, api_key: &str, payload: &DeliveryPayload)
    -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat-completion request with a constrained response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub response_format: serde_json::Value,
    pub messages: Vec<ChatMessage>,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns `choices[0].message.content`, or `None` when the provider sent no content.
    async fn complete(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> crate::error::Result<Option<String>>;
}
