//! Domain-specific error types for campaign-mailer

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for campaign-mailer operations
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Missing or malformed caller input; no outbound call was made.
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Another draft or send run holds the campaign.
    #[error("Busy: {message}")]
    Busy { message: String },

    /// Provider answered with a non-success status.
    #[error("{provider} returned {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    /// Provider could not be reached or the response could not be read.
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Model response did not include any content")]
    MissingContent,

    #[error("Could not parse model output: {raw}")]
    UnparseableOutput { raw: String },

    #[error("CSV import error: {message}")]
    Import { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CampaignError {
    pub fn validation(message: impl Into<String>) -> Self {
        CampaignError::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CampaignError::NotFound {
            message: message.into(),
        }
    }

    /// HTTP status used when this error is surfaced through the API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CampaignError::Validation { .. } | CampaignError::Import { .. } => {
                StatusCode::BAD_REQUEST
            }
            CampaignError::NotFound { .. } => StatusCode::NOT_FOUND,
            CampaignError::Busy { .. } => StatusCode::CONFLICT,
            CampaignError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            CampaignError::Transport { .. } => StatusCode::BAD_GATEWAY,
            CampaignError::MissingContent | CampaignError::UnparseableOutput { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CampaignError::Config { .. }
            | CampaignError::Storage { .. }
            | CampaignError::Serialization { .. }
            | CampaignError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CampaignError::Config { .. } => "config",
            CampaignError::Validation { .. } => "validation",
            CampaignError::NotFound { .. } => "not_found",
            CampaignError::Busy { .. } => "busy",
            CampaignError::Upstream { .. } => "upstream",
            CampaignError::Transport { .. } => "transport",
            CampaignError::MissingContent => "missing_content",
            CampaignError::UnparseableOutput { .. } => "unparseable_output",
            CampaignError::Import { .. } => "import",
            CampaignError::Storage { .. } => "storage",
            CampaignError::Serialization { .. } => "serialization",
            CampaignError::Internal { .. } => "internal",
        }
    }
}

impl From<anyhow::Error> for CampaignError {
    fn from(err: anyhow::Error) -> Self {
        CampaignError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CampaignError {
    fn from(err: serde_json::Error) -> Self {
        CampaignError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for CampaignError {
    fn from(err: reqwest::Error) -> Self {
        CampaignError::Transport {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<csv::Error> for CampaignError {
    fn from(err: csv::Error) -> Self {
        CampaignError::Import {
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for CampaignError {
    fn from(err: JsonRejection) -> Self {
        CampaignError::Validation {
            message: err.body_text(),
        }
    }
}

impl From<std::io::Error> for CampaignError {
    fn from(err: std::io::Error) -> Self {
        CampaignError::Storage {
            message: err.to_string(),
        }
    }
}

/// Convert CampaignError to a JSON API response
impl IntoResponse for CampaignError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": {
                "code": status.as_u16(),
                "kind": self.label(),
                "message": self.to_string(),
            }
        });
        match &self {
            CampaignError::Upstream { body: detail, .. } => {
                body["error"]["details"] = json!(detail);
            }
            CampaignError::UnparseableOutput { raw } => {
                body["error"]["raw"] = json!(raw);
            }
            _ => {}
        }
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, axum::Json(body)).into_response()
    }
}

/// Result type alias for campaign-mailer operations
pub type Result<T> = std::result::Result<T, CampaignError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CampaignError::validation("missing apiKey").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CampaignError::UnparseableOutput { raw: "x".into() }.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            CampaignError::Upstream {
                provider: "LLM".into(),
                status: 401,
                body: "nope".into()
            }
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CampaignError::Busy { message: "c".into() }.status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_unparseable_is_distinct_from_transport() {
        let parse = CampaignError::UnparseableOutput {
            raw: "not json".into(),
        };
        assert!(parse.to_string().contains("Could not parse"));
        assert!(parse.to_string().contains("not json"));
        let transport = CampaignError::Transport {
            message: "connection refused".into(),
        };
        assert_ne!(parse.label(), transport.label());
    }
}
