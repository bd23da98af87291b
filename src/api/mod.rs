//! Management API for the proxy.
//!
//! Endpoints:
//! - GET /api/status, /api/auth-status, /api/models
//! - GET|POST /api/config
//! - POST /api/start, /api/stop, /api/restart, /api/oauth/{provider}
//! - GET|DELETE /api/stats
//! - GET /api/logs?lines=N
//! - GET|POST /api/providers, POST /api/providers/test
//! - POST /api/proxy
//! - GET /api/update/check, POST /api/update/apply
//! - GET|POST /api/factory-config, POST /api/factory-config/{add,remove}
//!
//! Everything else is served from the embedded GUI.

mod handlers;
mod types;


use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use rust_embed::Embed;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::OAuthProvider;
use crate::config::{Config, LogVerbosity};
use crate::error::ManagerError;
use crate::factory::FactoryStore;
use crate::process::Supervisor;
use crate::providers::ProviderRegistry;
use crate::stats::{JsonFileBackend, StatsRecorder};
use crate::update::Updater;

pub use types::*;

#[derive(Embed)]
#[folder = "static/"]
struct StaticAssets;

/// Application state shared across handlers.
pub struct AppState {
    pub config: Config,
    pub supervisor: Supervisor,
    pub registry: ProviderRegistry,
    pub stats: StatsRecorder,
    pub updater: Updater,
    pub factory: FactoryStore,
}

impl AppState {
    /// State with stats persisted next to the other data files.
    pub fn new(config: Config) -> Self {
        let stats = StatsRecorder::new(JsonFileBackend::new(config.data.stats_path()));
        Self::with_stats(config, stats)
    }

    pub fn with_stats(config: Config, stats: StatsRecorder) -> Self {
        Self {
            supervisor: Supervisor::new(config.proxy.clone()),
            registry: ProviderRegistry::new(config.data.providers_path()),
            updater: Updater::new(config.update.clone(), config.data.version_path()),
            factory: FactoryStore::new(config.factory.config.clone()),
            stats,
            config,
        }
    }

    pub fn verbosity(&self) -> LogVerbosity {
        self.config.app.log_verbosity
    }

    /// Token directory: explicit setting, then `auth-dir` from config.yaml, then the data dir.
    pub fn auth_dir(&self) -> PathBuf {
        self.config
            .data
            .auth_dir
            .clone()
            .or_else(|| self.supervisor.config_file().settings().auth_dir_path())
            .unwrap_or_else(|| self.config.data.dir.clone())
    }

    /// First client key from config.yaml, used to authenticate against the proxy.
    pub fn proxy_api_key(&self) -> Option<String> {
        self.supervisor
            .config_file()
            .settings()
            .api_keys
            .into_iter()
            .find(|k| !k.trim().is_empty())
    }

    /// Registry lookup first, then the model family, else "other".
    pub fn attribute_provider(&self, model: Option<&str>) -> String {
        let Some(model) = model else {
            return "other".to_string();
        };
        self.registry
            .provider_for_model(model)
            .or_else(|| OAuthProvider::from_model(model).map(|p| p.to_string()))
            .unwrap_or_else(|| "other".to_string())
    }
}

/// Create the API router from configuration.
pub fn create_router(config: Config) -> Router {
    create_router_with_state(Arc::new(AppState::new(config)))
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/auth-status", get(handlers::get_auth_status))
        .route("/api/models", get(handlers::list_models))
        .route("/api/config", get(handlers::get_config).post(handlers::set_config))
        .route("/api/start", post(handlers::start_proxy))
        .route("/api/stop", post(handlers::stop_proxy))
        .route("/api/restart", post(handlers::restart_proxy))
        .route("/api/oauth/{provider}", post(handlers::start_oauth))
        .route("/api/stats", get(handlers::get_stats).delete(handlers::reset_stats))
        .route("/api/logs", get(handlers::get_logs))
        .route("/api/providers", get(handlers::get_providers).post(handlers::set_providers))
        .route("/api/providers/test", post(handlers::test_provider))
        .route("/api/proxy", post(handlers::proxy_passthrough))
        .route("/api/update/check", get(handlers::check_update))
        .route("/api/update/apply", post(handlers::apply_update))
        .route(
            "/api/factory-config",
            get(handlers::get_factory_config).post(handlers::set_factory_config),
        )
        .route("/api/factory-config/add", post(handlers::add_factory_models))
        .route("/api/factory-config/remove", post(handlers::remove_factory_models))
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state)
        .fallback(static_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(preflight))
}

/// Answer every OPTIONS request with 204 and permissive CORS headers.
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

/// Serve embedded static files; anything else is a JSON 404.
async fn static_handler(uri: axum::http::Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path == "api" || path.starts_with("api/") {
        return ManagerError::NotFound(format!("endpoint /{}", path)).into_response();
    }
    let asset = if path.is_empty() { "index.html" } else { path };

    match StaticAssets::get(asset) {
        Some(content) => {
            let mime = mime_guess::from_path(asset).first_or_octet_stream().to_string();
            ([(header::CONTENT_TYPE, mime)], Body::from(content.data.into_owned())).into_response()
        }
        None => ManagerError::NotFound(format!("path /{}", path)).into_response(),
    }
}
