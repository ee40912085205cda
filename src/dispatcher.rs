//! Batch dispatcher: sequential per-recipient sends with a cooldown after each full batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clients::traits::{Address, DeliveryError, DeliveryPayload, DeliveryTransport};
use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_COOLDOWN_MINUTES};
use crate::error::{CampaignError, Result};
use crate::models::{DispatchResult, OutboundMessage};

/// Upper bound applied to the cooldown after converting from minutes.
pub const MAX_COOLDOWN_MS: u64 = 15_000;

const TRACKING_TAGS: [&str; 2] = ["campaign", "tracking"];

/// Body of the send entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub enable_tracking: bool,
    #[serde(default)]
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub cooldown_minutes: Option<f64>,
    #[serde(default)]
    pub messages: Vec<OutboundMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResponse {
    pub results: Vec<DispatchResult>,
}

/// Convert minutes to a sleep, clamped to `[0, MAX_COOLDOWN_MS]`.
pub fn cooldown_duration(minutes: f64) -> Duration {
    if !minutes.is_finite() {
        return Duration::ZERO;
    }
    let ms = (minutes * 60_000.0).clamp(0.0, MAX_COOLDOWN_MS as f64);
    Duration::from_millis(ms as u64)
}

/// True when `index` closes a batch and more messages follow.
/// A non-positive batch size disables batching.
pub fn ends_batch(index: usize, batch_size: i64, total: usize) -> bool {
    if batch_size <= 0 {
        return false;
    }
    (index + 1) % batch_size as usize == 0 && index + 1 < total
}

fn non_blank(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

pub struct Dispatcher {
    transport: Arc<dyn DeliveryTransport>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn DeliveryTransport>) -> Self {
        Self { transport }
    }

    fn validate(request: &DispatchRequest) -> Result<()> {
        if request.api_key.trim().is_empty() {
            return Err(CampaignError::validation("Missing delivery API key"));
        }
        if request.from.trim().is_empty() {
            return Err(CampaignError::validation("Missing sender address"));
        }
        if request.messages.is_empty() {
            return Err(CampaignError::validation("No messages to send"));
        }
        Ok(())
    }

    fn payload(request: &DispatchRequest, message: &OutboundMessage) -> DeliveryPayload {
        DeliveryPayload {
            from: request.from.trim().to_string(),
            to: vec![Address {
                email: message.email.trim().to_string(),
                name: message.name.trim().to_string(),
            }],
            subject: message.subject.clone(),
            html: message.html.clone(),
            text: message.text.clone(),
            reply_to: non_blank(request.reply_to.as_deref()),
            tags: request
                .enable_tracking
                .then(|| TRACKING_TAGS.iter().map(|t| t.to_string()).collect()),
        }
    }

    /// Send every message in order and return one result per message.
    ///
    /// Validation failures return an error before any provider call. Per-message
    /// failures are recorded in the results and never stop the loop.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<Vec<DispatchResult>> {
        Self::validate(request)?;

        let total = request.messages.len();
        let batch_size = request.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let cooldown =
            cooldown_duration(request.cooldown_minutes.unwrap_or(DEFAULT_COOLDOWN_MINUTES));
        let api_key = request.api_key.trim();
        let started = Instant::now();

        info!(
            "Dispatching {} messages (batch_size={}, cooldown_ms={})",
            total,
            batch_size,
            cooldown.as_millis()
        );

        let mut results = Vec::with_capacity(total);
        for (index, message) in request.messages.iter().enumerate() {
            let result = if message.email.trim().is_empty() {
                DispatchResult::failed(&message.id, "Missing recipient email")
            } else {
                let payload = Self::payload(request, message);
                match self.transport.deliver(api_key, &payload).await {
                    Ok(()) => DispatchResult::sent(&message.id),
                    Err(DeliveryError::Rejected { status, message: msg }) => {
                        warn!("Send to {} rejected ({}): {}", message.email, status, msg);
                        DispatchResult::failed(&message.id, msg)
                    }
                    Err(DeliveryError::Transport(msg)) => {
                        warn!("Send to {} failed: {}", message.email, msg);
                        DispatchResult::failed(&message.id, msg)
                    }
                }
            };
            results.push(result);

            if !cooldown.is_zero() && ends_batch(index, batch_size, total) {
                info!(
                    "Batch of {} complete ({}/{}), cooling down for {}ms",
                    batch_size,
                    index + 1,
                    total,
                    cooldown.as_millis()
                );
                tokio::time::sleep(cooldown).await;
            }
        }

        let sent = results.iter().filter(|r| r.ok).count();
        info!(
            "Dispatch finished: {} sent, {} failed in {}ms",
            sent,
            total - sent,
            started.elapsed().as_millis()
        );

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records each payload; fails recipients listed in `reject`.
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<DeliveryPayload>>,
        reject: Vec<(String, DeliveryError)>,
    }

    #[async_trait]
    impl DeliveryTransport for RecordingTransport {
        async fn deliver(
            &self,
            _api_key: &str,
            payload: &DeliveryPayload,
        ) -> std::result::Result<(), DeliveryError> {
            self.calls.lock().await.push(payload.clone());
            let to = &payload.to[0].email;
            match self.reject.iter().find(|(email, _)| email == to) {
                Some((_, err)) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn messages(n: usize) -> Vec<OutboundMessage> {
        (0..n)
            .map(|i| OutboundMessage {
                id: format!("m{i}"),
                email: format!("user{i}@example.com"),
                name: format!("User {i}"),
                subject: "Hello".into(),
                html: "<p>Hi</p>".into(),
                text: "Hi".into(),
            })
            .collect()
    }

    fn request(n: usize) -> DispatchRequest {
        DispatchRequest {
            api_key: "key".into(),
            from: "sender@example.com".into(),
            messages: messages(n),
            ..Default::default()
        }
    }

    #[test]
    fn test_cooldown_clamp() {
        assert_eq!(cooldown_duration(0.0), Duration::ZERO);
        assert_eq!(cooldown_duration(100.0), Duration::from_millis(15_000));
        assert_eq!(cooldown_duration(-5.0), Duration::ZERO);
        assert_eq!(cooldown_duration(0.1), Duration::from_millis(6_000));
        assert_eq!(cooldown_duration(f64::NAN), Duration::ZERO);
    }

    #[test]
    fn test_ends_batch() {
        assert!(ends_batch(1, 2, 5));
        assert!(!ends_batch(0, 2, 5));
        // last message never triggers a cooldown
        assert!(!ends_batch(3, 2, 4));
        assert!(!ends_batch(4, 20, 5));
        assert!(!ends_batch(0, 0, 5));
        assert!(!ends_batch(0, -1, 5));
    }

    #[tokio::test]
    async fn test_validation_short_circuits() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(transport.clone());

        let mut missing_key = request(2);
        missing_key.api_key = "  ".into();
        let err = dispatcher.dispatch(&missing_key).await.unwrap_err();
        assert!(matches!(err, CampaignError::Validation { .. }));

        let mut missing_from = request(2);
        missing_from.from = String::new();
        assert!(dispatcher.dispatch(&missing_from).await.is_err());

        assert!(dispatcher.dispatch(&request(0)).await.is_err());
        assert!(transport.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_results_match_input_order_and_failures_continue() {
        let transport = Arc::new(RecordingTransport {
            reject: vec![
                (
                    "user1@example.com".into(),
                    DeliveryError::Rejected {
                        status: 429,
                        message: "rate limited".into(),
                    },
                ),
                (
                    "user2@example.com".into(),
                    DeliveryError::Transport("connection reset".into()),
                ),
            ],
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(transport.clone());
        let mut req = request(4);
        req.cooldown_minutes = Some(0.0);

        let results = dispatcher.dispatch(&req).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3"]);
        assert_eq!(results[0], DispatchResult::sent("m0"));
        assert_eq!(results[1], DispatchResult::failed("m1", "rate limited"));
        assert_eq!(results[2], DispatchResult::failed("m2", "connection reset"));
        assert!(results[3].ok);
        assert_eq!(transport.calls.lock().await.len(), 4);
    }

    #[tokio::test]
    async fn test_payload_mapping() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(transport.clone());
        let mut req = request(1);
        req.reply_to = Some("replies@example.com".into());
        req.enable_tracking = true;

        dispatcher.dispatch(&req).await.unwrap();
        let calls = transport.calls.lock().await;
        let p = &calls[0];
        assert_eq!(p.from, "sender@example.com");
        assert_eq!(p.to[0].email, "user0@example.com");
        assert_eq!(p.to[0].name, "User 0");
        assert_eq!(p.reply_to.as_deref(), Some("replies@example.com"));
        assert_eq!(
            p.tags,
            Some(vec!["campaign".to_string(), "tracking".to_string()])
        );
    }

    #[tokio::test]
    async fn test_blank_email_fails_without_call() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(transport.clone());
        let mut req = request(2);
        req.messages[0].email = " ".into();
        req.cooldown_minutes = Some(0.0);

        let results = dispatcher.dispatch(&req).await.unwrap();
        assert!(!results[0].ok);
        assert!(results[1].ok);
        assert_eq!(transport.calls.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_between_batches() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(transport);
        let mut req = request(5);
        req.batch_size = Some(2);
        req.cooldown_minutes = Some(100.0);

        let start = tokio::time::Instant::now();
        dispatcher.dispatch(&req).await.unwrap();
        // cooldowns after index 1 and 3; none after the final message
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30_000));
        assert!(elapsed < Duration::from_millis(45_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cooldown_when_batch_covers_list() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(transport);
        let mut req = request(4);
        req.batch_size = Some(4);
        req.cooldown_minutes = Some(5.0);

        let start = tokio::time::Instant::now();
        let results = dispatcher.dispatch(&req).await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
