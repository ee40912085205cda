//! Data models shared by the dispatcher, the draft generator and the campaign store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fully rendered message ready for the delivery provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub text: String,
}

/// Outcome of one send attempt, matched to its message by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResult {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn sent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Subject, HTML and plain-text templates of a campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Templates {
    #[serde(default)]
    pub goal: String,
    #[serde(default, alias = "subjectTemplate")]
    pub subject: String,
    #[serde(default, alias = "bodyTemplate")]
    pub html: String,
    #[serde(default, alias = "plainTextTemplate")]
    pub text: String,
}

/// A contact with personalization fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Extra CSV columns, keyed by header.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// All fields including `email` and `name`, in a stable order.
    pub fn all_fields(&self) -> Vec<(String, String)> {
        let mut out = vec![
            ("email".to_string(), self.email.clone()),
            ("name".to_string(), self.name.clone()),
        ];
        for (k, v) in &self.fields {
            if k.eq_ignore_ascii_case("email") || k.eq_ignore_ascii_case("name") {
                continue;
            }
            out.push((k.clone(), v.clone()));
        }
        out
    }

    /// Case-insensitive field lookup.
    pub fn field(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("email") {
            return Some(&self.email);
        }
        if key.eq_ignore_ascii_case("name") {
            return Some(&self.name);
        }
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Read-only input to the draft generator.
#[derive(Debug, Clone)]
pub struct DraftContext {
    pub goal: String,
    pub subject_template: String,
    pub body_template: String,
    pub plain_text_template: String,
    pub recipient: Recipient,
    pub instructions: String,
}

impl DraftContext {
    pub fn new(templates: &Templates, recipient: Recipient, instructions: String) -> Self {
        Self {
            goal: templates.goal.clone(),
            subject_template: templates.subject.clone(),
            body_template: templates.html.clone(),
            plain_text_template: templates.text.clone(),
            recipient,
            instructions,
        }
    }
}

/// LLM-generated subject/HTML/text triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftResult {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Per-recipient progress through a campaign.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    #[default]
    Pending,
    Drafted,
    Sent,
    Failed,
}

impl RecipientStatus {
    /// Status after a draft attempt. Re-running resets from the new outcome.
    pub fn after_draft(self, ok: bool) -> Self {
        if ok {
            RecipientStatus::Drafted
        } else {
            RecipientStatus::Failed
        }
    }

    /// Status after a send attempt.
    pub fn after_send(self, ok: bool) -> Self {
        if ok {
            RecipientStatus::Sent
        } else {
            RecipientStatus::Failed
        }
    }
}

/// A recipient as tracked inside a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignRecipient {
    #[serde(flatten)]
    pub recipient: Recipient,
    #[serde(default)]
    pub status: RecipientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<DraftResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl From<Recipient> for CampaignRecipient {
    fn from(recipient: Recipient) -> Self {
        Self {
            recipient,
            status: RecipientStatus::Pending,
            draft: None,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub templates: Templates,
    #[serde(default)]
    pub recipients: Vec<CampaignRecipient>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(name: impl Into<String>, templates: Templates) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            templates,
            recipients: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn recipient_mut(&mut self, id: &str) -> Option<&mut CampaignRecipient> {
        self.recipients.iter_mut().find(|r| r.recipient.id == id)
    }

    /// Counts per status, in `pending, drafted, sent, failed` order.
    pub fn status_counts(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for r in &self.recipients {
            let idx = match r.status {
                RecipientStatus::Pending => 0,
                RecipientStatus::Drafted => 1,
                RecipientStatus::Sent => 2,
                RecipientStatus::Failed => 3,
            };
            counts[idx] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_result_ok_has_no_error_field() {
        let v = serde_json::to_value(DispatchResult::sent("m1")).unwrap();
        assert_eq!(v, serde_json::json!({"id": "m1", "ok": true}));
    }

    #[test]
    fn test_status_transitions() {
        let s = RecipientStatus::Pending;
        assert_eq!(s.after_draft(true), RecipientStatus::Drafted);
        assert_eq!(s.after_draft(false), RecipientStatus::Failed);
        assert_eq!(
            RecipientStatus::Drafted.after_send(true),
            RecipientStatus::Sent
        );
        assert_eq!(
            RecipientStatus::Pending.after_send(false),
            RecipientStatus::Failed
        );
        // re-running from a terminal state resets from the new outcome
        assert_eq!(
            RecipientStatus::Failed.after_send(true),
            RecipientStatus::Sent
        );
    }

    #[test]
    fn test_recipient_field_lookup_is_case_insensitive() {
        let mut r = Recipient::new("a@example.com", "Ada");
        r.fields.insert("Company".into(), "Acme".into());
        assert_eq!(r.field("company"), Some("Acme"));
        assert_eq!(r.field("EMAIL"), Some("a@example.com"));
        assert_eq!(r.field("missing"), None);
    }

    #[test]
    fn test_templates_accept_long_names() {
        let t: Templates = serde_json::from_value(serde_json::json!({
            "goal": "book a demo",
            "subjectTemplate": "Hi {{name}}",
            "bodyTemplate": "<p>Hello</p>",
            "plainTextTemplate": "Hello"
        }))
        .unwrap();
        assert_eq!(t.subject, "Hi {{name}}");
        assert_eq!(t.html, "<p>Hello</p>");
    }
}
