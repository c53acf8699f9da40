//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::logic::safety::ControllerMode;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    safety_mode: ControllerMode,
    models: usize,
    features: usize,
    timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let safety_mode = state.control.safety.mode();
    Json(HealthResponse {
        status: match safety_mode {
            ControllerMode::Normal => "healthy",
            ControllerMode::Emergency => "degraded",
        },
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        safety_mode,
        models: state.control.registry.len(),
        features: state.control.features.len(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}
