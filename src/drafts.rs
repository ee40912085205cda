//! Draft generation: one structured prompt per recipient, one completion call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::clients::traits::{ChatMessage, ChatRequest, CompletionClient};
use crate::config::LlmConfig;
use crate::error::{CampaignError, Result};
use crate::models::{DraftContext, DraftResult, Recipient, Templates};

const SYSTEM_PROMPT: &str = "You write personalized outbound emails. \
Respond only with JSON containing the string fields subject, html and text.";

/// Body of the draft entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub templates: Templates,
    #[serde(default)]
    pub recipient: Recipient,
}

/// `response_format` constraining the completion to the draft shape.
pub fn draft_response_format() -> serde_json::Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "email_draft",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "subject": { "type": "string" },
                    "html": { "type": "string" },
                    "text": { "type": "string" }
                },
                "required": ["subject", "html", "text"],
                "additionalProperties": false
            }
        }
    })
}

/// Compose the user prompt. Templates are embedded verbatim, unrendered.
pub fn build_prompt(ctx: &DraftContext) -> String {
    let recipient = ctx
        .recipient
        .all_fields()
        .into_iter()
        .map(|(k, v)| format!("- {}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Campaign goal:\n{goal}\n\n\
         Subject template:\n{subject}\n\n\
         HTML body template:\n{html}\n\n\
         Plain-text template:\n{text}\n\n\
         Recipient:\n{recipient}\n\n\
         Instructions:\n{instructions}\n\n\
         Personalize the templates for this recipient and return subject, html and text.",
        goal = ctx.goal,
        subject = ctx.subject_template,
        html = ctx.body_template,
        text = ctx.plain_text_template,
        recipient = recipient,
        instructions = ctx.instructions,
    )
}

/// Parse model content into a draft, keeping the raw content on failure.
pub fn parse_draft(content: &str) -> Result<DraftResult> {
    let trimmed = strip_code_fence(content.trim());
    serde_json::from_str::<DraftResult>(trimmed).map_err(|_| CampaignError::UnparseableOutput {
        raw: content.to_string(),
    })
}

fn strip_code_fence(s: &str) -> &str {
    s.strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(s)
}

pub struct DraftGenerator {
    client: Arc<dyn CompletionClient>,
    settings: LlmConfig,
}

impl DraftGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, settings: LlmConfig) -> Self {
        Self { client, settings }
    }

    fn resolve(value: Option<&str>, default: &str) -> String {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    /// Generate a draft for one recipient.
    pub async fn generate(&self, request: &DraftRequest) -> Result<DraftResult> {
        let api_key = request.api_key.trim();
        if api_key.is_empty() {
            return Err(CampaignError::validation("Missing LLM API key"));
        }
        if request.recipient.email.trim().is_empty() {
            return Err(CampaignError::validation("Missing recipient email"));
        }

        let model = Self::resolve(request.model.as_deref(), &self.settings.default_model);
        let instructions = Self::resolve(
            request.instructions.as_deref(),
            &self.settings.default_instructions,
        );
        let ctx = DraftContext::new(&request.templates, request.recipient.clone(), instructions);

        let chat = ChatRequest {
            model,
            temperature: self.settings.temperature,
            response_format: draft_response_format(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(&ctx)),
            ],
        };

        tracing::debug!(
            "Generating draft for {} (model={})",
            ctx.recipient.email,
            chat.model
        );

        let content = self
            .client
            .complete(api_key, &chat)
            .await?
            .ok_or(CampaignError::MissingContent)?;

        parse_draft(&content)
    }
}
