//! `{{ key }}` placeholder rendering against recipient fields

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::{OutboundMessage, Recipient, Templates};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\- ]+?)\s*\}\}").expect("placeholder regex should compile")
});

/// Substitute placeholders; unknown keys render as empty strings.
pub fn render(template: &str, recipient: &Recipient) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            recipient.field(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned()
}

/// Render all three templates for one recipient.
pub fn render_message(templates: &Templates, recipient: &Recipient) -> OutboundMessage {
    OutboundMessage {
        id: recipient.id.clone(),
        email: recipient.email.clone(),
        name: recipient.name.clone(),
        subject: render(&templates.subject, recipient),
        html: render(&templates.html, recipient),
        text: render(&templates.text, recipient),
    }
}
