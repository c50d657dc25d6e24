//! HTTP API gateway for Freshmate.
//!
//! Exposes the conversation service over REST: a health check plus the
//! per-thread turn and history endpoints under `/v1`.
//!
//! Built on Axum.

pub mod api_v1;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use tracing::info;

use freshmate_agent::ConversationService;
use freshmate_config::AppConfig;
use freshmate_core::Error;
use freshmate_providers::OpenAiCompatProvider;
use freshmate_services::{InventoryService, RecipeService};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub service: Arc<ConversationService>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: `/health` plus the v1 API.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Wire services, tools, model provider and history store from configuration.
pub fn build_service(config: &AppConfig) -> Result<ConversationService, Error> {
    let inventory = Arc::new(InventoryService::new(&config.inventory)?);
    let recipes = Arc::new(RecipeService::new(&config.recipes)?);
    let tools = Arc::new(freshmate_tools::default_registry(inventory, recipes)?);
    let provider = Arc::new(OpenAiCompatProvider::new(&config.model)?);
    let history = freshmate_memory::from_config(&config.history);

    info!(
        tools = tools.len(),
        model = %config.model.model,
        history = history.name(),
        "Conversation service assembled"
    );
    Ok(ConversationService::new(provider, tools, history, &config.agent))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Error> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let service = Arc::new(build_service(&config)?);
    let app = build_router(Arc::new(GatewayState { service }));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::config(format!("cannot bind {addr}: {e}")))?;
    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_support::state(vec![]));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn build_service_requires_model_key() {
        let err = build_service(&AppConfig::default()).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn build_service_from_complete_config() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-test".into());
        assert!(build_service(&config).is_ok());
    }
}
