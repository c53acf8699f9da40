//! Model handlers

use std::collections::BTreeMap;

use axum::{extract::{Path, State}, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::logic::model::{ModelDescriptor, ModelOutput};
use crate::logic::safety::{SafetyLevel, SafetyVerdict};
use crate::{AppError, AppResult, AppState};

/// Verdict summary returned alongside every model output
#[derive(Debug, Serialize)]
pub struct SafetySummary {
    verdict: SafetyLevel,
    violations: Vec<String>,
    warnings: Vec<String>,
    skipped: Vec<String>,
    fallback_applied: bool,
    override_applied: bool,
    escalated: bool,
}

impl From<&SafetyVerdict> for SafetySummary {
    fn from(v: &SafetyVerdict) -> Self {
        Self {
            verdict: v.level,
            violations: v.violations.clone(),
            warnings: v.warnings.clone(),
            skipped: v.skipped.clone(),
            fallback_applied: v.fallback_applied(),
            override_applied: v.override_applied,
            escalated: v.escalated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InferenceResponse {
    model_id: String,
    data: ModelOutput,
    safety: SafetySummary,
    timestamp: DateTime<Utc>,
}

/// List registered models
pub async fn list(State(state): State<AppState>) -> Json<Vec<ModelDescriptor>> {
    Json(state.control.registry.list())
}

/// Run inference through the safety-gated pipeline. `capacity-planning` and
/// `capacity_planning` address the same model.
pub async fn infer(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    Json(inputs): Json<BTreeMap<String, f64>>,
) -> AppResult<Json<InferenceResponse>> {
    let model_id = state.control.registry.resolve_id(&model_id);
    let result = state.control.pipeline.run(&model_id, &inputs)?;
    let safety = SafetySummary::from(&result.safety);

    if let Some(message) = result.error {
        return Err(AppError::Inference {
            message,
            data: serde_json::to_value(&result.data)?,
            safety: serde_json::to_value(&safety)?,
        });
    }

    Ok(Json(InferenceResponse {
        model_id: result.model_id,
        data: result.data,
        safety,
        timestamp: result.timestamp,
    }))
}
