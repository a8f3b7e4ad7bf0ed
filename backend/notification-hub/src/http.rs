//! HTTP surface: health, metrics, hub stats and the WebSocket upgrade

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;

use crate::hub::{HubHandle, HubState};
use crate::metrics;
use crate::publisher::Publisher;
use crate::websocket::ws_handler;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub publisher: Publisher,
    /// Used when a client connects without `lang`
    pub default_language: String,
}

#[derive(Debug, Serialize)]
pub struct HubStats {
    pub connected: usize,
    pub state: HubState,
    pub offline_publisher: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/hub/stats", get(hub_stats))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.hub.is_running() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Shutting down")
    }
}

async fn metrics_handler() -> Response {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn hub_stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(HubStats {
        connected: state.hub.registered_count().await,
        state: state.hub.state(),
        offline_publisher: state.publisher.is_offline(),
    })
}
