//! Campaign service status transitions over the in-memory store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use campaign_mailer::clients::{
    ChatRequest, CompletionClient, DeliveryError, DeliveryPayload, DeliveryTransport,
};
use campaign_mailer::config::Config;
use campaign_mailer::dispatcher::Dispatcher;
use campaign_mailer::drafts::DraftGenerator;
use campaign_mailer::error::{CampaignError, Result};
use campaign_mailer::models::{RecipientStatus, Templates};
use campaign_mailer::service::{CampaignService, DraftOptions, SendOptions};
use campaign_mailer::store::{CampaignStore, MemoryStore};

struct AlwaysOk;

#[async_trait]
impl DeliveryTransport for AlwaysOk {
    async fn deliver(
        &self,
        _api_key: &str,
        _payload: &DeliveryPayload,
    ) -> std::result::Result<(), DeliveryError> {
        Ok(())
    }
}

/// Fails drafts for recipients whose email starts with "bad"
struct PickyLlm;

#[async_trait]
impl CompletionClient for PickyLlm {
    async fn complete(&self, _api_key: &str, request: &ChatRequest) -> Result<Option<String>> {
        if request.messages[1].content.contains("- email: bad") {
            return Ok(Some("I cannot help with that".into()));
        }
        Ok(Some(r#"{"subject":"Drafted","html":"<p>d</p>","text":"d"}"#.into()))
    }
}

fn service(store: Arc<MemoryStore>, llm_key: Option<&str>) -> CampaignService {
    let mut config = Config::default();
    config.delivery.default_cooldown_minutes = 0.0;
    config.runtime.llm_api_key = llm_key.map(str::to_string);
    config.runtime.delivery_api_key = Some("delivery-key".into());
    let config = Arc::new(config);
    CampaignService::new(
        store,
        Dispatcher::new(Arc::new(AlwaysOk)),
        DraftGenerator::new(Arc::new(PickyLlm), config.llm.clone()),
        config,
    )
}

const CSV: &str = "email,name\ngood@example.com,Good\nbad@example.com,Bad\n";

#[tokio::test]
async fn test_import_dedupes_against_existing_recipients() {
    let store = Arc::new(MemoryStore::new());
    let svc = service(store, None);
    let c = svc.create("c", Templates::default()).await.unwrap();

    let first = svc.import_recipients(&c.id, CSV, false).await.unwrap();
    assert_eq!(first.added, 2);
    let second = svc.import_recipients(&c.id, CSV, false).await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.duplicates.len(), 2);
    assert_eq!(second.total, 2);

    let replaced = svc
        .import_recipients(&c.id, "email\nnew@example.com\n", true)
        .await
        .unwrap();
    assert_eq!(replaced.total, 1);
}

#[tokio::test]
async fn test_draft_all_marks_failures_and_uses_env_key() {
    let store = Arc::new(MemoryStore::new());
    let svc = service(store.clone(), Some("env-llm-key"));
    let c = svc.create("c", Templates::default()).await.unwrap();
    svc.import_recipients(&c.id, CSV, false).await.unwrap();

    let summary = svc.draft_all(&c.id, DraftOptions::default()).await.unwrap();
    assert_eq!(summary.drafted, 1);
    assert_eq!(summary.failed, 1);

    let saved = store.get(&c.id).await.unwrap().unwrap();
    assert_eq!(saved.recipients[0].status, RecipientStatus::Drafted);
    assert_eq!(saved.recipients[1].status, RecipientStatus::Failed);
    assert!(
        saved.recipients[1]
            .last_error
            .as_deref()
            .unwrap()
            .contains("Could not parse")
    );
}

#[tokio::test]
async fn test_draft_all_without_key_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let svc = service(store.clone(), None);
    let c = svc.create("c", Templates::default()).await.unwrap();
    svc.import_recipients(&c.id, CSV, false).await.unwrap();

    let err = svc
        .draft_all(&c.id, DraftOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CampaignError::Validation { .. }));
    let saved = store.get(&c.id).await.unwrap().unwrap();
    assert!(
        saved
            .recipients
            .iter()
            .all(|r| r.status == RecipientStatus::Pending)
    );
}

#[tokio::test]
async fn test_send_all_then_nothing_left() {
    let store = Arc::new(MemoryStore::new());
    let svc = service(store.clone(), None);
    let c = svc.create("c", Templates::default()).await.unwrap();
    svc.import_recipients(&c.id, CSV, false).await.unwrap();

    let options = SendOptions {
        from: "team@example.com".into(),
        ..Default::default()
    };
    let results = svc.send_all(&c.id, options.clone()).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.ok));

    // every recipient is now sent, so there is nothing to dispatch
    let err = svc.send_all(&c.id, options).await.unwrap_err();
    assert!(matches!(err, CampaignError::Validation { .. }));
}

#[tokio::test]
async fn test_unknown_campaign_is_not_found() {
    let svc = service(Arc::new(MemoryStore::new()), None);
    assert!(matches!(
        svc.get("nope").await.unwrap_err(),
        CampaignError::NotFound { .. }
    ));
    assert!(svc.create("  ", Templates::default()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_import_during_send_cooldown_survives() {
    let store = Arc::new(MemoryStore::new());
    let svc = Arc::new(service(store.clone(), None));
    let c = svc.create("c", Templates::default()).await.unwrap();
    svc.import_recipients(&c.id, CSV, false).await.unwrap();

    let options = SendOptions {
        from: "team@example.com".into(),
        batch_size: Some(1),
        cooldown_minutes: Some(1.0),
        ..Default::default()
    };
    let send = {
        let svc = svc.clone();
        let id = c.id.clone();
        let options = options.clone();
        tokio::spawn(async move { svc.send_all(&id, options).await })
    };

    // the send is now parked in its cooldown after the first recipient
    tokio::time::sleep(Duration::from_secs(5)).await;
    let imported = svc
        .import_recipients(&c.id, "email\nnew@example.com\n", false)
        .await
        .unwrap();
    assert_eq!(imported.added, 1);
    assert_eq!(imported.total, 3);

    // a second run on the same campaign is refused while the first holds it
    let err = svc.send_all(&c.id, options).await.unwrap_err();
    assert!(matches!(err, CampaignError::Busy { .. }));
    let err = svc
        .draft_all(&c.id, DraftOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CampaignError::Busy { .. }));

    let results = send.await.unwrap().unwrap();
    assert_eq!(results.len(), 2);

    let saved = store.get(&c.id).await.unwrap().unwrap();
    let emails: Vec<_> = saved
        .recipients
        .iter()
        .map(|r| r.recipient.email.as_str())
        .collect();
    assert_eq!(
        emails,
        vec!["good@example.com", "bad@example.com", "new@example.com"]
    );
    assert_eq!(saved.recipients[0].status, RecipientStatus::Sent);
    assert_eq!(saved.recipients[1].status, RecipientStatus::Sent);
    assert_eq!(saved.recipients[2].status, RecipientStatus::Pending);
}
