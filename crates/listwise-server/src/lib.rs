//! Listwise Server
//!
//! HTTP surface for the listing assistant: a streamed chat endpoint that runs
//! one manager turn per request, conversation reset, and draft review.
//! This is a library crate; the server is started via `start_server()`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::Method, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use listwise_core::agent::{ManagerConfig, ManagerOrchestrator, ManagerServices};
use listwise_core::storage::{Database, Stores};
use listwise_core::Settings;

pub mod error;
pub mod routes;
pub mod types;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ManagerOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<ManagerOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Build production state from settings: open the database and wire the
    /// model backend and services.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let db = Database::new(&settings.database_path)?;
        let services = ManagerServices::from_settings(settings, db)?;
        let config = ManagerConfig::from(&settings.agents);
        tracing::info!(
            db = %settings.database_path.display(),
            max_steps = config.max_steps,
            bulk_concurrency = config.bulk_concurrency,
            "Manager ready"
        );
        Ok(Self::new(Arc::new(ManagerOrchestrator::new(services, config))))
    }

    pub fn stores(&self) -> &Stores {
        &self.orchestrator.services().stores
    }
}

/// Build the app router around existing state.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .nest("/api", routes::api_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Listwise server and block until shutdown.
pub async fn start_server(settings: &Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", settings.server.port).parse()?;
    let app = build_router(AppState::from_settings(settings)?);

    tracing::info!("Listwise server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        features: HashMap::from([("chat".to_string(), true), ("drafts".to_string(), true)]),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    features: HashMap<String, bool>,
}
