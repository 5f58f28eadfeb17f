//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod auth;
pub mod error;
pub mod health;
pub mod metrics;
pub mod resource;
pub mod telemetry;
pub mod timing;
pub mod worker;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AuthMethod;
use crate::metric::{MemorySink, Telemetry};
use crate::tracker::ResourceTracker;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<dyn ResourceTracker>,
    pub telemetry: Telemetry,
    /// Ring buffer behind `GET /api/metrics/recent`
    pub recent: Arc<MemorySink>,
    pub auth: Arc<AuthMethod>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        // Fleet endpoints
        .route(
            "/api/workers",
            get(worker::list_workers).post(worker::register_worker),
        )
        // Provisioning path
        .route("/api/containers", post(resource::register_container))
        .route(
            "/api/containers/{handle}/created",
            post(resource::confirm_container),
        )
        .route("/api/volumes", post(resource::register_volume))
        .route("/api/volumes/{handle}/created", post(resource::confirm_volume))
        // Telemetry ingest
        .route("/api/telemetry/scheduling", post(telemetry::record_scheduling))
        .route("/api/telemetry/builds", post(telemetry::record_build))
        .route("/api/metrics/recent", get(metrics::recent_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        // Public endpoints
        .route("/health", get(health::health_check))
        .route("/teams/{team}/login", get(auth::login_page))
        .route("/auth/{provider}", get(auth::authorize))
        .merge(protected)
        // Add state and middleware
        .layer(middleware::from_fn_with_state(
            state.clone(),
            timing::record_response_time,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
