//! HTTP handlers for the management API.

use super::types::*;
use super::AppState;
use crate::auth::{auth_status, OAuthProvider};
use crate::error::ManagerError;
use crate::http::{create_client_with_timeout, PASSTHROUGH_TIMEOUT, PROBE_TIMEOUT};
use crate::logger::{log_request, ProxiedRequest};
use crate::process::ServerStatus;
use crate::providers::{probe_provider, RegistryDocument};
use crate::stats::StatsSnapshot;
use crate::update::{InstallResult, UpdateInfo};
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_LOG_LINES: usize = 100;
const MAX_LOG_LINES: usize = 10_000;
const FALLBACK_FACTORY_KEY: &str = "dummy-not-used";

type ApiResult<T> = Result<Json<T>, ManagerError>;

// ============================================================================
// Process lifecycle
// ============================================================================

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    Json(state.supervisor.status().await)
}

pub async fn start_proxy(State(state): State<Arc<AppState>>) -> ApiResult<LifecycleResponse> {
    let info = state.supervisor.start().await?;
    Ok(Json(LifecycleResponse {
        success: true,
        pid: info.pid,
        message: format!("Proxy started (pid {})", info.pid),
    }))
}

pub async fn stop_proxy(State(state): State<Arc<AppState>>) -> ApiResult<LifecycleResponse> {
    let pid = state.supervisor.stop().await?;
    Ok(Json(LifecycleResponse {
        success: true,
        pid,
        message: format!("Proxy stopped (pid {})", pid),
    }))
}

pub async fn restart_proxy(State(state): State<Arc<AppState>>) -> ApiResult<LifecycleResponse> {
    let info = state.supervisor.restart().await?;
    Ok(Json(LifecycleResponse {
        success: true,
        pid: info.pid,
        message: format!("Proxy restarted (pid {})", info.pid),
    }))
}

pub async fn start_oauth(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> ApiResult<MessageResponse> {
    let provider: OAuthProvider = provider.parse().map_err(ManagerError::InvalidInput)?;
    let pid = state.supervisor.login(provider.login_flag()).await?;
    Ok(Json(MessageResponse::ok(format!(
        "{} login started (pid {}); finish it in the browser window",
        provider, pid
    ))))
}

pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogsResponse> {
    let lines = match query.lines.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_LOG_LINES,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ManagerError::InvalidInput(format!("lines must be a number, got '{}'", raw)))?
            .min(MAX_LOG_LINES),
    };
    let tail = state.supervisor.logs(lines)?;
    Ok(Json(LogsResponse {
        success: true,
        lines: tail.lines,
        total: tail.total,
    }))
}

// ============================================================================
// Auth and models
// ============================================================================

pub async fn get_auth_status(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<OAuthProvider, bool>> {
    Json(auth_status(&state.auth_dir()))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> ApiResult<ModelsResponse> {
    if state.supervisor.cached_process().await.is_none() {
        return Err(ManagerError::NotRunning);
    }

    let url = format!("{}/v1/models", state.supervisor.proxy_base_url());
    let mut req = create_client_with_timeout(PROBE_TIMEOUT).get(&url);
    if let Some(key) = state.proxy_api_key() {
        req = req.bearer_auth(key);
    }
    let response = req
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ManagerError::UpstreamUnavailable(e.to_string()))?;
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ManagerError::UpstreamUnavailable(format!("invalid models response: {}", e)))?;

    let models = body["data"]
        .as_array()
        .map(|data| {
            data.iter()
                .filter_map(|m| m["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(Json(ModelsResponse { success: true, models }))
}

// ============================================================================
// Proxy configuration
// ============================================================================

pub async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<ConfigResponse> {
    let content = state.supervisor.config_file().read()?;
    Ok(Json(ConfigResponse { success: true, content }))
}

pub async fn set_config(
    State(state): State<Arc<AppState>>,
    ApiJson(update): ApiJson<ConfigUpdate>,
) -> ApiResult<ConfigSaved> {
    let backup = state.supervisor.config_file().write(&update.content)?;
    Ok(Json(ConfigSaved {
        success: true,
        message: "Config saved".to_string(),
        backup: backup.map(|p| p.display().to_string()),
    }))
}

// ============================================================================
// Stats
// ============================================================================

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsSnapshot> {
    Ok(Json(state.stats.get_stats()?))
}

pub async fn reset_stats(State(state): State<Arc<AppState>>) -> ApiResult<MessageResponse> {
    state.stats.reset_stats()?;
    Ok(Json(MessageResponse::ok("Stats reset")))
}

// ============================================================================
// Provider registry
// ============================================================================

pub async fn get_providers(State(state): State<Arc<AppState>>) -> ApiResult<RegistryDocument> {
    Ok(Json(state.registry.load()?))
}

pub async fn set_providers(
    State(state): State<Arc<AppState>>,
    ApiJson(update): ApiJson<ProvidersUpdate>,
) -> ApiResult<ProvidersSaved> {
    let count = state.registry.set(update.providers, update.merge)?;
    Ok(Json(ProvidersSaved { success: true, count }))
}

pub async fn test_provider(
    ApiJson(req): ApiJson<ProviderTestRequest>,
) -> ApiResult<ProviderTestResponse> {
    let probe = probe_provider(&req.base_url, req.api_key.as_deref()).await?;
    tracing::info!(
        provider = req.name.as_deref().unwrap_or("unnamed"),
        latency_ms = probe.latency_ms,
        models = probe.model_count,
        "provider probe succeeded"
    );
    Ok(Json(ProviderTestResponse { success: true, probe }))
}

// ============================================================================
// Passthrough
// ============================================================================

/// Forward a request to the proxy and relay its raw response.
pub async fn proxy_passthrough(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ProxyRequest>,
) -> Result<Response, ManagerError> {
    if !req.path.starts_with('/') {
        return Err(ManagerError::InvalidInput(format!(
            "path must start with '/', got '{}'",
            req.path
        )));
    }
    let method = reqwest::Method::from_bytes(req.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ManagerError::InvalidInput(format!("invalid method '{}'", req.method)))?;

    let model = req
        .body
        .as_ref()
        .and_then(|b| b.get("model"))
        .and_then(|m| m.as_str())
        .map(str::to_string);
    let provider = state.attribute_provider(model.as_deref());

    let url = format!("{}{}", state.supervisor.proxy_base_url(), req.path);
    let mut upstream = create_client_with_timeout(PASSTHROUGH_TIMEOUT).request(method.clone(), &url);
    if let Some(key) = state.proxy_api_key() {
        upstream = upstream.bearer_auth(key);
    }
    if let Some(body) = &req.body {
        upstream = upstream.json(body);
    }

    let started = Instant::now();
    let outcome = match upstream.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/json")
                .to_string();
            response
                .bytes()
                .await
                .map(|body| (status, content_type, body))
                .map_err(|e| e.to_string())
        }
        Err(e) => Err(e.to_string()),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    let mut record = ProxiedRequest {
        method: method.to_string(),
        path: req.path.clone(),
        model: model.clone(),
        provider: provider.clone(),
        status: 0,
        latency_ms,
        error: None,
    };
    match &outcome {
        Ok((status, _, _)) => record.status = *status,
        Err(e) => record.error = Some(e.clone()),
    }
    log_request(&record, state.verbosity());

    if let Err(e) = state.stats.record_request(
        record.succeeded(),
        Some(&provider),
        model.as_deref(),
        Some(latency_ms as f64),
    ) {
        tracing::warn!(error = %e, "failed to record request stats");
    }

    let (status, content_type, body) =
        outcome.map_err(|e| ManagerError::UpstreamUnavailable(format!("{}: {}", url, e)))?;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, [(header::CONTENT_TYPE, content_type)], Body::from(body)).into_response())
}

// ============================================================================
// Updates
// ============================================================================

pub async fn check_update(State(state): State<Arc<AppState>>) -> ApiResult<UpdateInfo> {
    Ok(Json(state.updater.check().await?))
}

/// Body is optional: `{downloadUrl}` overrides the branch archive URL.
pub async fn apply_update(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<InstallResult> {
    let req: UpdateApplyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        UpdateApplyRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    Ok(Json(state.updater.apply(&state.supervisor, req.download_url).await?))
}

// ============================================================================
// Factory CLI config
// ============================================================================

fn factory_response(config: serde_json::Value) -> Json<FactoryResponse> {
    Json(FactoryResponse {
        success: true,
        added: None,
        removed: None,
        config,
    })
}

pub async fn get_factory_config(State(state): State<Arc<AppState>>) -> ApiResult<FactoryResponse> {
    Ok(factory_response(state.factory.get()?))
}

pub async fn set_factory_config(
    State(state): State<Arc<AppState>>,
    ApiJson(doc): ApiJson<serde_json::Value>,
) -> ApiResult<FactoryResponse> {
    Ok(factory_response(state.factory.replace(doc)?))
}

pub async fn add_factory_models(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<FactoryModelsRequest>,
) -> ApiResult<FactoryResponse> {
    let base_url = format!("{}/v1", state.supervisor.proxy_base_url());
    let api_key = state
        .proxy_api_key()
        .unwrap_or_else(|| FALLBACK_FACTORY_KEY.to_string());
    let (config, added) = state.factory.add(&req.models, &base_url, &api_key)?;
    Ok(Json(FactoryResponse {
        success: true,
        added: Some(added),
        removed: None,
        config,
    }))
}

pub async fn remove_factory_models(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<FactoryModelsRequest>,
) -> ApiResult<FactoryResponse> {
    let (config, removed) = state.factory.remove(&req.models)?;
    Ok(Json(FactoryResponse {
        success: true,
        added: None,
        removed: Some(removed),
        config,
    }))
}

// ============================================================================
// Fallbacks
// ============================================================================

pub async fn method_not_allowed() -> ManagerError {
    ManagerError::MethodNotAllowed
}
