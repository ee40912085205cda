//! Campaign persistence behind an injectable store interface

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{CampaignError, Result};
use crate::models::Campaign;

/// In-place edit applied by [`CampaignStore::update`].
pub type CampaignEdit = Box<dyn FnOnce(&mut Campaign) + Send>;

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// All campaigns, newest first.
    async fn list(&self) -> Result<Vec<Campaign>>;
    async fn get(&self, id: &str) -> Result<Option<Campaign>>;
    /// Insert or replace by id.
    async fn save(&self, campaign: &Campaign) -> Result<()>;
    /// Read-modify-write of one campaign under the store's write lock.
    /// Returns the edited campaign, or `None` when the id is unknown.
    async fn update(&self, id: &str, edit: CampaignEdit) -> Result<Option<Campaign>>;
    /// Returns whether a campaign was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

fn sorted(mut campaigns: Vec<Campaign>) -> Vec<Campaign> {
    campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    campaigns
}

#[derive(Default)]
pub struct MemoryStore {
    campaigns: RwLock<HashMap<String, Campaign>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn list(&self) -> Result<Vec<Campaign>> {
        Ok(sorted(self.campaigns.read().await.values().cloned().collect()))
    }

    async fn get(&self, id: &str) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(id).cloned())
    }

    async fn save(&self, campaign: &Campaign) -> Result<()> {
        self.campaigns
            .write()
            .await
            .insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn update(&self, id: &str, edit: CampaignEdit) -> Result<Option<Campaign>> {
        let mut campaigns = self.campaigns.write().await;
        Ok(campaigns.get_mut(id).map(|campaign| {
            edit(campaign);
            campaign.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.campaigns.write().await.remove(id).is_some())
    }
}

/// All campaigns kept in one JSON document, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<Campaign>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| CampaignError::Storage {
                message: format!("{} is not a valid campaign file: {}", self.path.display(), e),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, campaigns: &[Campaign]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(campaigns)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<Campaign>> {
        let _guard = self.lock.read().await;
        Ok(sorted(self.read_all().await?))
    }

    async fn get(&self, id: &str) -> Result<Option<Campaign>> {
        let _guard = self.lock.read().await;
        Ok(self.read_all().await?.into_iter().find(|c| c.id == id))
    }

    async fn save(&self, campaign: &Campaign) -> Result<()> {
        let _guard = self.lock.write().await;
        let mut all = self.read_all().await?;
        match all.iter_mut().find(|c| c.id == campaign.id) {
            Some(existing) => *existing = campaign.clone(),
            None => all.push(campaign.clone()),
        }
        self.write_all(&all).await
    }

    async fn update(&self, id: &str, edit: CampaignEdit) -> Result<Option<Campaign>> {
        let _guard = self.lock.write().await;
        let mut all = self.read_all().await?;
        let Some(campaign) = all.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        edit(campaign);
        let updated = campaign.clone();
        self.write_all(&all).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.write().await;
        let mut all = self.read_all().await?;
        let before = all.len();
        all.retain(|c| c.id != id);
        if all.len() == before {
            return Ok(false);
        }
        self.write_all(&all).await?;
        Ok(true)
    }
}
