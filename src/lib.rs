pub mod clients;
pub mod config;
pub mod dispatcher;
pub mod drafts;
pub mod error;
pub mod http;
pub mod models;
pub mod recipients;
pub mod service;
pub mod store;
pub mod template;

use std::sync::Arc;

use anyhow::Result;

use crate::clients::{ChatCompletionsClient, HttpDeliveryClient};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::drafts::DraftGenerator;
use crate::service::CampaignService;
use crate::store::{CampaignStore, JsonFileStore};

/// Install the tracing subscriber using `RUST_LOG` or the configured default filter.
pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.runtime.log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
    for warning in &config.load_warnings {
        tracing::warn!("{}", warning);
    }
}

/// Wire the real provider clients around the given store.
pub fn build_service(config: Arc<Config>, store: Arc<dyn CampaignStore>) -> Result<CampaignService> {
    let delivery = HttpDeliveryClient::new(
        config.delivery.api_base.clone(),
        config.delivery.request_timeout_ms,
    )?;
    let llm = ChatCompletionsClient::new(config.llm.api_base.clone(), config.llm.request_timeout_ms)?;

    Ok(CampaignService::new(
        store,
        Dispatcher::new(Arc::new(delivery)),
        DraftGenerator::new(Arc::new(llm), config.llm.clone()),
        config,
    ))
}

/// Service backed by the JSON file store at `storage.path`.
pub fn build_default_service(config: Arc<Config>) -> Result<CampaignService> {
    let store: Arc<dyn CampaignStore> = Arc::new(JsonFileStore::new(config.storage.path.clone()));
    tracing::debug!("Using campaign store at {}", config.storage.path.display());
    build_service(config, store)
}
