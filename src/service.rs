//! Campaign-level operations: recipient import, drafting and sending.
//!
//! Drives the recipient status machine from dispatcher and draft outcomes and
//! persists progress through the injected [`CampaignStore`]. Outcomes are
//! written back per recipient with [`CampaignStore::update`], so edits made
//! while a run is in flight survive it. At most one draft or send run holds a
//! campaign at a time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::drafts::{DraftGenerator, DraftRequest};
use crate::error::{CampaignError, Result};
use crate::models::{
    Campaign, CampaignRecipient, DispatchResult, OutboundMessage, RecipientStatus, Templates,
};
use crate::recipients::import_csv;
use crate::store::CampaignStore;
use crate::template::render_message;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub templates: Option<Templates>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub added: usize,
    pub total: usize,
    pub skipped_rows: Vec<usize>,
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftOptions {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    pub drafted: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default)]
    pub api_key: Option<String>,
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
}

pub struct CampaignService {
    store: Arc<dyn CampaignStore>,
    dispatcher: Dispatcher,
    drafts: DraftGenerator,
    config: Arc<Config>,
    runs: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn pick_key(explicit: Option<&str>, fallback: Option<&String>) -> String {
    explicit
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| fallback.cloned())
        .unwrap_or_default()
}

impl CampaignService {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        dispatcher: Dispatcher,
        drafts: DraftGenerator,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            drafts,
            config,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the campaign for a draft or send run; fails fast when one is
    /// already in progress.
    async fn claim(&self, id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .runs
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone();
        lock.try_lock_owned().map_err(|_| CampaignError::Busy {
            message: format!("campaign {id} already has a draft or send in progress"),
        })
    }

    async fn edit(
        &self,
        id: &str,
        edit: impl FnOnce(&mut Campaign) + Send + 'static,
    ) -> Result<Option<Campaign>> {
        self.store
            .update(
                id,
                Box::new(move |campaign: &mut Campaign| {
                    edit(campaign);
                    campaign.touch();
                }),
            )
            .await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn drafts(&self) -> &DraftGenerator {
        &self.drafts
    }

    pub async fn list(&self) -> Result<Vec<Campaign>> {
        self.store.list().await
    }

    pub async fn get(&self, id: &str) -> Result<Campaign> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| CampaignError::not_found(format!("campaign {id}")))
    }

    pub async fn create(&self, name: &str, templates: Templates) -> Result<Campaign> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CampaignError::validation("Campaign name is required"));
        }
        let campaign = Campaign::new(name, templates);
        self.store.save(&campaign).await?;
        info!("Created campaign {} ({})", campaign.name, campaign.id);
        Ok(campaign)
    }

    pub async fn update(&self, id: &str, update: CampaignUpdate) -> Result<Campaign> {
        let name = update.name.map(|n| n.trim().to_string());
        if name.as_deref().is_some_and(str::is_empty) {
            return Err(CampaignError::validation("Campaign name is required"));
        }
        let templates = update.templates;
        self.edit(id, move |campaign| {
            if let Some(name) = name {
                campaign.name = name;
            }
            if let Some(templates) = templates {
                campaign.templates = templates;
            }
        })
        .await?
        .ok_or_else(|| CampaignError::not_found(format!("campaign {id}")))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.runs.lock().await.remove(id);
        if self.store.delete(id).await? {
            Ok(())
        } else {
            Err(CampaignError::not_found(format!("campaign {id}")))
        }
    }

    /// Append (or with `replace`, swap in) recipients parsed from CSV text.
    /// Emails already in the campaign count as duplicates.
    pub async fn import_recipients(
        &self,
        id: &str,
        csv: &str,
        replace: bool,
    ) -> Result<ImportSummary> {
        let report = import_csv(csv.as_bytes())?;
        let incoming = report.recipients.clone();
        let campaign = self
            .edit(id, move |campaign| {
                if replace {
                    campaign.recipients.clear();
                }
                let mut known: HashSet<String> = campaign
                    .recipients
                    .iter()
                    .map(|r| r.recipient.email.to_lowercase())
                    .collect();
                for recipient in incoming {
                    if known.insert(recipient.email.to_lowercase()) {
                        campaign.recipients.push(CampaignRecipient::from(recipient));
                    }
                }
            })
            .await?
            .ok_or_else(|| CampaignError::not_found(format!("campaign {id}")))?;

        // Imported recipients carry fresh ids, so whatever did not land was a duplicate
        let landed: HashSet<&str> = campaign
            .recipients
            .iter()
            .map(|r| r.recipient.id.as_str())
            .collect();
        let mut summary = ImportSummary {
            total: campaign.recipients.len(),
            skipped_rows: report.skipped_rows,
            duplicates: report.duplicates,
            ..Default::default()
        };
        for recipient in report.recipients {
            if landed.contains(recipient.id.as_str()) {
                summary.added += 1;
            } else {
                summary.duplicates.push(recipient.email);
            }
        }
        info!(
            "Imported {} recipients into {} ({} total)",
            summary.added, campaign.id, summary.total
        );
        Ok(summary)
    }

    /// Draft every recipient not yet sent, one at a time.
    pub async fn draft_all(&self, id: &str, options: DraftOptions) -> Result<DraftSummary> {
        let _run = self.claim(id).await?;
        let campaign = self.get(id).await?;
        let api_key = pick_key(
            options.api_key.as_deref(),
            self.config.runtime.llm_api_key.as_ref(),
        );
        if api_key.is_empty() {
            return Err(CampaignError::validation("Missing LLM API key"));
        }

        let mut summary = DraftSummary::default();
        for entry in &campaign.recipients {
            if entry.status == RecipientStatus::Sent {
                summary.skipped += 1;
                continue;
            }
            let request = DraftRequest {
                api_key: api_key.clone(),
                model: options.model.clone(),
                instructions: options.instructions.clone(),
                templates: campaign.templates.clone(),
                recipient: entry.recipient.clone(),
            };
            let (draft, error) = match self.drafts.generate(&request).await {
                Ok(draft) => {
                    summary.drafted += 1;
                    (Some(draft), None)
                }
                Err(e) => {
                    warn!("Draft for {} failed: {}", entry.recipient.email, e);
                    summary.failed += 1;
                    (None, Some(e.to_string()))
                }
            };

            let recipient_id = entry.recipient.id.clone();
            let saved = self
                .edit(id, move |campaign| {
                    if let Some(r) = campaign.recipient_mut(&recipient_id) {
                        r.status = r.status.after_draft(draft.is_some());
                        if draft.is_some() {
                            r.draft = draft;
                        }
                        r.last_error = error;
                    }
                })
                .await?;
            if saved.is_none() {
                return Err(CampaignError::not_found(format!("campaign {id}")));
            }
        }

        info!(
            "Drafting for {} finished: {} drafted, {} failed, {} skipped",
            campaign.id, summary.drafted, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    /// Messages for every recipient not yet sent: the draft when present,
    /// otherwise the rendered templates.
    pub fn outbound_messages(campaign: &Campaign) -> Vec<OutboundMessage> {
        campaign
            .recipients
            .iter()
            .filter(|r| r.status != RecipientStatus::Sent)
            .map(|r| match &r.draft {
                Some(draft) => OutboundMessage {
                    id: r.recipient.id.clone(),
                    email: r.recipient.email.clone(),
                    name: r.recipient.name.clone(),
                    subject: draft.subject.clone(),
                    html: draft.html.clone(),
                    text: draft.text.clone(),
                },
                None => render_message(&campaign.templates, &r.recipient),
            })
            .collect()
    }

    /// Send to every recipient not yet sent and record each outcome.
    pub async fn send_all(&self, id: &str, options: SendOptions) -> Result<Vec<DispatchResult>> {
        let _run = self.claim(id).await?;
        let campaign = self.get(id).await?;
        let request = DispatchRequest {
            api_key: pick_key(
                options.api_key.as_deref(),
                self.config.runtime.delivery_api_key.as_ref(),
            ),
            from: options.from,
            reply_to: options.reply_to,
            enable_tracking: options.enable_tracking,
            batch_size: options
                .batch_size
                .or(Some(self.config.delivery.default_batch_size)),
            cooldown_minutes: options
                .cooldown_minutes
                .or(Some(self.config.delivery.default_cooldown_minutes)),
            messages: Self::outbound_messages(&campaign),
        };

        let results = self.dispatcher.dispatch(&request).await?;

        let outcomes = results.clone();
        let saved = self
            .edit(id, move |campaign| {
                for result in outcomes {
                    if let Some(entry) = campaign.recipient_mut(&result.id) {
                        entry.status = entry.status.after_send(result.ok);
                        entry.last_error = result.error;
                    }
                }
            })
            .await?;
        if saved.is_none() {
            warn!("Campaign {} was deleted during send; outcomes not recorded", id);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DraftResult, Recipient};

    #[test]
    fn test_pick_key() {
        let fallback = "env-key".to_string();
        assert_eq!(pick_key(Some(" k "), Some(&fallback)), "k");
        assert_eq!(pick_key(Some(""), Some(&fallback)), "env-key");
        assert_eq!(pick_key(None, None), "");
    }

    #[test]
    fn test_outbound_messages_prefer_draft_and_skip_sent() {
        let mut campaign = Campaign::new(
            "c",
            Templates {
                goal: String::new(),
                subject: "Hi {{name}}".into(),
                html: "<p>{{name}}</p>".into(),
                text: "{{name}}".into(),
            },
        );
        let mut drafted: CampaignRecipient = Recipient::new("a@example.com", "Ann").into();
        drafted.draft = Some(DraftResult {
            subject: "Custom".into(),
            html: "<p>custom</p>".into(),
            text: "custom".into(),
        });
        drafted.status = RecipientStatus::Drafted;
        let plain: CampaignRecipient = Recipient::new("b@example.com", "Ben").into();
        let mut sent: CampaignRecipient = Recipient::new("c@example.com", "Cy").into();
        sent.status = RecipientStatus::Sent;
        campaign.recipients = vec![drafted, plain, sent];

        let msgs = CampaignService::outbound_messages(&campaign);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].subject, "Custom");
        assert_eq!(msgs[1].subject, "Hi Ben");
    }
}
