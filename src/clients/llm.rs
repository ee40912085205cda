//! OpenAI-compatible chat-completion client

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::clients::traits::{ChatRequest, CompletionClient};
use crate::error::{CampaignError, Result};

pub struct ChatCompletionsClient {
    client: Client,
    base: String,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

impl ChatCompletionsClient {
    pub fn new(base: impl Into<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("Failed to build reqwest client with timeout")?;
        Ok(Self {
            client,
            base: base.into(),
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base.trim_end_matches('/'))
    }
}

/// Extract `choices[0].message.content` from a raw completion body.
pub fn extract_content(body: &str) -> Result<Option<String>> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|_| CampaignError::UnparseableOutput {
            raw: body.to_string(),
        })?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .filter(|c| !c.trim().is_empty()))
}

#[async_trait]
impl CompletionClient for ChatCompletionsClient {
    async fn complete(&self, api_key: &str, request: &ChatRequest) -> Result<Option<String>> {
        tracing::debug!(
            "Requesting completion (model={}, messages={})",
            request.model,
            request.messages.len()
        );

        let resp = self
            .client
            .post(self.url())
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(CampaignError::Upstream {
                provider: "LLM provider".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        extract_content(&body)
    }
}
