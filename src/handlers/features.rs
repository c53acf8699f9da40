//! Feature store handlers

use axum::{extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::logic::features::{Feature, FeatureKind, FeatureSummary, Freshness, RefreshReport};
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub name: String,
    pub value: f64,
    pub kind: Option<FeatureKind>,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct FeatureResponse {
    #[serde(flatten)]
    feature: Feature,
    freshness: Freshness,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<FeatureSummary>> {
    Json(state.control.features.list())
}

pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<FeatureResponse>> {
    let features = &state.control.features;
    let feature = features.require(&name)?;
    Ok(Json(FeatureResponse {
        feature: feature.as_ref().clone(),
        freshness: features.freshness(&name),
    }))
}

/// Manual injection (replays, operator overrides of a signal)
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> AppResult<(StatusCode, Json<FeatureResponse>)> {
    let feature = Feature::new(
        req.name.trim(),
        req.value,
        req.kind.unwrap_or(FeatureKind::RealTime),
        req.ttl_secs.unwrap_or(state.config.feature_ttl_secs),
    );
    let features = &state.control.features;
    features.ingest(feature.clone())?;

    Ok((
        StatusCode::CREATED,
        Json(FeatureResponse {
            freshness: features.freshness(&feature.name),
            feature,
        }),
    ))
}

pub async fn invalidate(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    if state.control.features.invalidate(&name) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("feature '{}' not found", name)))
    }
}

/// Run one refresh cycle now instead of waiting for the background loop
pub async fn refresh(State(state): State<AppState>) -> Json<RefreshReport> {
    Json(state.control.refresh_features())
}
