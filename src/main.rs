use std::sync::Arc;

use anyhow::Result;
use campaign_mailer::{build_default_service, config::Config, http, init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::load()?);
    init_tracing(&config);

    info!("Starting campaign-mailer control panel");

    let service = Arc::new(build_default_service(config.clone())?);
    let state = http::HttpState::new(config, service);

    http::start_http_server(state).await
}
