//! Safety controller handlers

use axum::{extract::{Query, State}, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::model::ModelCategory;
use crate::logic::safety::{ControllerMode, SafetyStatus};
use crate::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct EmergencyQuery {
    pub enable: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmergencyResponse {
    previous_mode: ControllerMode,
    mode: ControllerMode,
    reason: Option<String>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub category: ModelCategory,
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct OverrideResponse {
    category: ModelCategory,
    enabled: bool,
    previous: bool,
}

/// Enter / leave emergency mode
pub async fn emergency_mode(
    State(state): State<AppState>,
    Query(query): Query<EmergencyQuery>,
) -> AppResult<Json<EmergencyResponse>> {
    let reason = query.reason.unwrap_or_else(|| "manual".to_string());
    let safety = &state.control.safety;

    let previous_mode = safety.set_emergency_mode(query.enable, &reason);
    tracing::warn!(
        "Emergency mode {} via API ({} -> {}): {}",
        if query.enable { "enable" } else { "disable" },
        previous_mode,
        safety.mode(),
        reason
    );

    Ok(Json(EmergencyResponse {
        previous_mode,
        mode: safety.mode(),
        reason: safety.status().emergency_reason,
        timestamp: Utc::now(),
    }))
}

/// Human override for one category (UNSAFE outputs pass, CRITICAL never)
pub async fn set_override(
    State(state): State<AppState>,
    Json(req): Json<OverrideRequest>,
) -> AppResult<Json<OverrideResponse>> {
    let previous = state.control.safety.set_override(req.category, req.enabled);
    Ok(Json(OverrideResponse {
        category: req.category,
        enabled: req.enabled,
        previous,
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<SafetyStatus> {
    Json(state.control.safety.status())
}
