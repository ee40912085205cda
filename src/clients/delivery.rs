//! HTTP client for the transactional email provider

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::clients::traits::{DeliveryError, DeliveryPayload, DeliveryTransport};

const UNEXPECTED_ERROR: &str = "Unexpected error";

pub struct HttpDeliveryClient {
    client: Client,
    endpoint: String,
}

impl HttpDeliveryClient {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("Failed to build reqwest client with timeout")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

/// Pick the provider's message out of an error body, tolerating malformed JSON.
pub fn provider_error_message(status: u16, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_body = parsed.as_ref().and_then(|v| {
        let text = |field: &Value| -> Option<String> {
            match field {
                Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                Value::Object(obj) => obj
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string),
                Value::Array(items) => {
                    let joined = items
                        .iter()
                        .filter_map(|i| i.as_str())
                        .collect::<Vec<_>>()
                        .join("; ");
                    (!joined.is_empty()).then_some(joined)
                }
                _ => None,
            }
        };
        v.get("message")
            .and_then(text)
            .or_else(|| v.get("error").and_then(text))
            .or_else(|| v.get("errors").and_then(text))
    });
    from_body.unwrap_or_else(|| format!("Send failed ({status})"))
}

/// Textual form of a client-side failure.
pub fn transport_message(err: &dyn std::fmt::Display) -> String {
    let msg = err.to_string();
    if msg.trim().is_empty() {
        UNEXPECTED_ERROR.to_string()
    } else {
        msg
    }
}

#[async_trait]
impl DeliveryTransport for HttpDeliveryClient {
    async fn deliver(
        &self,
        api_key: &str,
        payload: &DeliveryPayload,
    ) -> Result<(), DeliveryError> {
        debug!(
            "POST {} (to={}, subject_chars={})",
            self.endpoint,
            payload.to.first().map(|a| a.email.as_str()).unwrap_or(""),
            payload.subject.len()
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(transport_message(&e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            message: provider_error_message(status.as_u16(), &body),
        })
    }
}
