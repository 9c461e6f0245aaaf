//! Embedded HTTP API.
//!
//! One [`Storage`] behind a `tokio::sync::Mutex`, one LLM provider and one
//! text extractor are built at startup and shared through [`AppState`].
//! Every `/api` route resolves the caller from a bearer token and scopes its
//! work to the caller's organization.

pub mod ai;
pub mod auth;
pub mod goals;
pub mod import;
pub mod measures;
pub mod reports;
pub mod response;
pub mod teams;
pub mod users;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, Uri, header},
    routing::get,
};
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::ai::{Advisor, AnthropicProvider, LlmProvider, MockProvider};
use crate::config::{LlmBackend, ResolvedConfig, ResolvedLlm};
use crate::import::{PlainTextExtractor, TextExtractor};
use crate::storage::Storage;
use crate::{Error, Result};
use response::ApiError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<Storage>>,
    /// Shares `storage` with the state for its audit writes
    pub advisor: Advisor,
    pub extractor: Arc<dyn TextExtractor>,
}

impl AppState {
    pub fn new(
        storage: Storage,
        provider: Arc<dyn LlmProvider>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        let storage = Arc::new(Mutex::new(storage));
        let advisor = Advisor::new(Arc::clone(&storage), provider);
        Self {
            storage,
            advisor,
            extractor,
        }
    }
}

/// Pick the LLM backend. `auto` means Anthropic when a key is set.
pub fn build_provider(llm: &ResolvedLlm) -> Result<Arc<dyn LlmProvider>> {
    let timeout = Duration::from_secs(llm.timeout_secs.value);
    match (llm.provider.value, &llm.api_key) {
        (LlmBackend::Mock, _) | (LlmBackend::Auto, None) => Ok(Arc::new(MockProvider::new())),
        (LlmBackend::Anthropic | LlmBackend::Auto, Some(key)) => Ok(Arc::new(
            AnthropicProvider::new(key.clone(), llm.model.value.clone(), timeout)?,
        )),
        (LlmBackend::Anthropic, None) => Err(Error::Config(
            "llm provider is anthropic but no API key is set".to_string(),
        )),
    }
}

/// CORS for the configured browser origins. With none configured, no
/// cross-origin requests are allowed.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| Error::Config(format!("Invalid CORS origin: {}", o)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600)))
}

/// Build the full router.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/goals", goals::routes())
        .nest("/api/measures", measures::routes())
        .nest("/api/teams", teams::routes())
        .nest("/api/users", users::routes())
        .nest("/api/reports", reports::routes())
        .nest("/api/ai", ai::routes())
        .nest("/api/import", import::routes())
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("BEARING_GIT_COMMIT"),
        "built": env!("BEARING_BUILD_TIMESTAMP"),
    }))
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError(Error::NotFound(format!(
        "Route {} {} not found",
        method,
        uri.path()
    )))
}

/// Run the API until Ctrl-C.
pub async fn start_server(config: &ResolvedConfig) -> Result<()> {
    let storage = Storage::open(&config.database.value)?;
    let provider = build_provider(&config.llm)?;
    tracing::info!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        "LLM provider ready"
    );

    let state = AppState::new(storage, provider, Arc::new(PlainTextExtractor));
    let app = router(state, cors_layer(&config.cors_origins)?);

    let host_addr: std::net::IpAddr = config.host.value.parse().map_err(|e| {
        Error::Config(format!("Invalid host address '{}': {}", config.host.value, e))
    })?;
    let addr = SocketAddr::from((host_addr, config.port.value));

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        tracing::error!(%addr, error = %e, "failed to bind");
        e
    })?;
    tracing::info!(
        %addr,
        database = %config.database.value.display(),
        "bearing API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
