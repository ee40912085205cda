//! HTTP transport module for campaign-mailer
//!
//! Axum router exposing the send and draft entry points plus campaign CRUD.
//! Health, info, and metrics are plain JSON. Everything except `/health` sits
//! behind bearer auth when a token is configured.

use axum::{
    Json, Router,
    body::Body,
    extract::{FromRequest, MatchedPath, Path, Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use std::{cmp::Ordering, sync::Arc};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::dispatcher::{DispatchRequest, DispatchResponse};
use crate::drafts::DraftRequest;
use crate::error::{CampaignError, Result};
use crate::models::{Campaign, DraftResult, Templates};
use crate::service::{
    CampaignService, CampaignUpdate, DraftOptions, DraftSummary, ImportSummary, SendOptions,
};

/// Shared state for HTTP server
#[derive(Clone)]
pub struct HttpState {
    pub config: Arc<Config>,
    pub service: Arc<CampaignService>,
    pub metrics: Arc<Mutex<HttpMetrics>>,
}

impl HttpState {
    pub fn new(config: Arc<Config>, service: Arc<CampaignService>) -> Self {
        Self {
            config,
            service,
            metrics: Arc::new(Mutex::new(HttpMetrics::new())),
        }
    }
}

/// Metrics for HTTP server
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub last_request_unix: u64,
    pub errors_total: u64,
    pub latencies: Vec<f64>, // ring buffer for p95
    /// Keyed by matched route template, never by raw path.
    pub routes_count: std::collections::HashMap<String, u64>,
}

impl HttpMetrics {
    fn new() -> Self {
        Self {
            total_requests: 0,
            last_request_unix: unix_now(),
            errors_total: 0,
            latencies: Vec::with_capacity(256),
            routes_count: std::collections::HashMap::new(),
        }
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `Json` extractor whose rejection is rendered like every other API error.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CampaignError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Info endpoint
pub async fn info_handler(State(state): State<HttpState>) -> impl IntoResponse {
    let cfg = &state.config;
    Json(json!({
        "delivery": {
            "api_base": cfg.delivery.api_base,
            "default_batch_size": cfg.delivery.default_batch_size,
            "default_cooldown_minutes": cfg.delivery.default_cooldown_minutes,
            "key_configured": cfg.runtime.delivery_api_key.is_some()
        },
        "llm": {
            "api_base": cfg.llm.api_base,
            "default_model": cfg.llm.default_model,
            "key_configured": cfg.runtime.llm_api_key.is_some()
        },
        "storage": {
            "path": cfg.storage.path.display().to_string()
        },
        "server": {
            "bind": cfg.server.bind.to_string(),
            "auth": cfg.runtime.bearer_token.is_some()
        }
    }))
}

/// Metrics endpoint
pub async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    let metrics = state.metrics.lock().await.clone();

    let (avg_latency_ms, p95_latency_ms) = if metrics.latencies.is_empty() {
        (None, None)
    } else {
        let sum: f64 = metrics.latencies.iter().sum();
        let avg = sum / metrics.latencies.len() as f64;
        let mut sorted = metrics.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let p95_idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
        (Some(avg), sorted.get(p95_idx).copied())
    };

    let mut routes: Vec<_> = metrics.routes_count.iter().collect();
    routes.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let routes_top_5: Vec<_> = routes
        .into_iter()
        .take(5)
        .map(|(k, v)| json!({ "route": k, "count": v }))
        .collect();

    Json(json!({
        "metrics_version": "1",
        "total_requests": metrics.total_requests,
        "last_request_unix": metrics.last_request_unix,
        "errors_total": metrics.errors_total,
        "avg_latency_ms": avg_latency_ms,
        "p95_latency_ms": p95_latency_ms,
        "routes_top_5": routes_top_5
    }))
}

/// Dispatcher entry point
pub async fn send_handler(
    State(state): State<HttpState>,
    ApiJson(mut request): ApiJson<DispatchRequest>,
) -> Result<Json<DispatchResponse>> {
    let defaults = &state.config.delivery;
    request.batch_size = request.batch_size.or(Some(defaults.default_batch_size));
    request.cooldown_minutes = request
        .cooldown_minutes
        .or(Some(defaults.default_cooldown_minutes));
    let results = state.service.dispatcher().dispatch(&request).await?;
    Ok(Json(DispatchResponse { results }))
}

/// Draft entry point
pub async fn draft_handler(
    State(state): State<HttpState>,
    ApiJson(request): ApiJson<DraftRequest>,
) -> Result<Json<DraftResult>> {
    Ok(Json(state.service.drafts().generate(&request).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    #[serde(default)]
    pub templates: Templates,
}

pub async fn list_campaigns(State(state): State<HttpState>) -> Result<Json<Vec<Campaign>>> {
    Ok(Json(state.service.list().await?))
}

pub async fn create_campaign(
    State(state): State<HttpState>,
    ApiJson(body): ApiJson<CreateCampaign>,
) -> Result<(StatusCode, Json<Campaign>)> {
    let campaign = state.service.create(&body.name, body.templates).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn get_campaign(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<Json<Campaign>> {
    Ok(Json(state.service.get(&id).await?))
}

pub async fn update_campaign(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<CampaignUpdate>,
) -> Result<Json<Campaign>> {
    Ok(Json(state.service.update(&id, update).await?))
}

pub async fn delete_campaign(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub replace: bool,
}

/// Body is raw CSV text
pub async fn import_recipients(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Result<Json<ImportSummary>> {
    Ok(Json(
        state
            .service
            .import_recipients(&id, &body, query.replace)
            .await?,
    ))
}

pub async fn draft_campaign(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    ApiJson(options): ApiJson<DraftOptions>,
) -> Result<Json<DraftSummary>> {
    Ok(Json(state.service.draft_all(&id, options).await?))
}

pub async fn send_campaign(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    ApiJson(options): ApiJson<SendOptions>,
) -> Result<Json<DispatchResponse>> {
    let results = state.service.send_all(&id, options).await?;
    Ok(Json(DispatchResponse { results }))
}

fn unauthorized() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"code": 401, "message": "Unauthorized"}})),
    )
        .into_response()
}

/// Build the application router
pub fn build_router(state: HttpState) -> Router {
    let token = state.config.runtime.bearer_token.clone();
    let allow_q = state.config.server.allow_token_in_url;

    Router::new()
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/send", post(send_handler))
        .route("/api/draft", post(draft_handler))
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/campaigns/:id",
            get(get_campaign)
                .put(update_campaign)
                .delete(delete_campaign),
        )
        .route("/api/campaigns/:id/recipients", post(import_recipients))
        .route("/api/campaigns/:id/draft", post(draft_campaign))
        .route("/api/campaigns/:id/send", post(send_campaign))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            |State(metrics): State<Arc<Mutex<HttpMetrics>>>,
             req: Request,
             next: axum::middleware::Next| async move {
                let path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_else(|| "unmatched".to_string());
                let route = format!("{} {}", req.method(), path);
                let start = std::time::Instant::now();
                let resp = next.run(req).await;
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                let mut m = metrics.lock().await;
                m.latencies.push(latency_ms);
                if m.latencies.len() > 256 {
                    m.latencies.remove(0);
                }
                if !resp.status().is_success() {
                    m.errors_total = m.errors_total.saturating_add(1);
                }
                *m.routes_count.entry(route).or_insert(0) += 1;
                m.total_requests = m.total_requests.saturating_add(1);
                m.last_request_unix = unix_now();
                resp
            },
        ))
        // Bearer auth layer; disabled when no token is configured
        .layer(middleware::from_fn_with_state(
            (token, allow_q),
            |State((token, allow_q)): State<(Option<String>, bool)>,
             req: axum::http::Request<Body>,
             next: axum::middleware::Next| async move {
                if req.uri().path() == "/health" || req.method() == axum::http::Method::OPTIONS {
                    return next.run(req).await;
                }
                let Some(expected) = token else {
                    return next.run(req).await;
                };
                let headers: &HeaderMap = req.headers();
                let header_ok = headers
                    .get(header::AUTHORIZATION)
                    .and_then(|h| h.to_str().ok())
                    .map(|v| v == format!("Bearer {}", expected))
                    .unwrap_or(false);
                let mut query_ok = false;
                if !header_ok
                    && allow_q
                    && let Some(q) = req.uri().query()
                {
                    query_ok = q.split('&').any(|pair| {
                        pair.split_once('=').is_some_and(|(k, v)| {
                            (k == "access_token" || k == "token") && v == expected
                        })
                    });
                }
                if !(header_ok || query_ok) {
                    return unauthorized();
                }
                next.run(req).await
            },
        ))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_http_server(state: HttpState) -> anyhow::Result<()> {
    let bind = state.config.server.bind;
    if state.config.server.allow_token_in_url {
        tracing::warn!(
            "Token authentication via query parameters is enabled; this can leak tokens in logs/proxies. Consider using Authorization header instead."
        );
    }
    if state.config.runtime.bearer_token.is_none() {
        tracing::warn!("CAMPAIGN_BEARER_TOKEN not set; API is unauthenticated");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!("Starting HTTP server on {}", bind);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
