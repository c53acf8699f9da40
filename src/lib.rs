//! ML Control Plane
//!
//! Safety-gated control layer between ML models and the systems they steer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ML CONTROL PLANE                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  telemetry ─► Feature Store ─┐                               │
//! │                              ▼                               │
//! │  API (Axum) ─► Inference Pipeline ─► Model Registry          │
//! │                              │                               │
//! │                              ▼                               │
//! │                      Safety Controller ─► data | fallback    │
//! │                              ▲                               │
//! │  Configuration Manager ──────┘ (escalation / stale policy)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod logic;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};

use logic::control::ControlPlane;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub control: Arc<ControlPlane>,
    pub config: config::Config,
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    let model_routes = Router::new()
        .route("/models", get(handlers::models::list))
        .route("/models/list", get(handlers::models::list))
        .route("/models/:model_id", post(handlers::models::infer));

    let safety_routes = Router::new()
        .route("/safety/emergency-mode", post(handlers::safety::emergency_mode))
        .route("/safety/override", post(handlers::safety::set_override))
        .route("/safety/status", get(handlers::safety::status));

    let config_routes = Router::new()
        .route("/config/active", get(handlers::config::active))
        .route("/config/versions", get(handlers::config::versions))
        .route("/config/propose", post(handlers::config::propose))
        .route("/config/validate", post(handlers::config::validate))
        .route("/config/deploy", post(handlers::config::deploy))
        .route("/config/rollback", post(handlers::config::rollback))
        .route("/config/drift", post(handlers::config::drift));

    let feature_routes = Router::new()
        .route("/features", get(handlers::features::list))
        .route("/features", post(handlers::features::ingest))
        .route("/features/refresh", post(handlers::features::refresh))
        .route("/features/:name", get(handlers::features::get))
        .route("/features/:name", delete(handlers::features::invalidate));

    Router::new()
        .route("/health", get(handlers::health::check))
        .merge(model_routes)
        .merge(safety_routes)
        .merge(config_routes)
        .merge(feature_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
