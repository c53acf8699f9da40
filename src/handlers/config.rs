//! Configuration lifecycle handlers

use axum::{extract::{Query, State}, Json};
use serde::Deserialize;

use crate::logic::config::{
    DeployStrategy, DriftReport, ParamMap, ValidationOutcome, VersionInfo,
};
use crate::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: String,
}

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub namespace: String,
    pub params: ParamMap,
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VersionRequest {
    pub namespace: String,
    pub version: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeployRequest {
    pub namespace: String,
    pub version: u64,
    #[serde(default)]
    pub strategy: DeployStrategy,
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub namespace: String,
    pub to_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DriftRequest {
    pub namespace: String,
    pub observed: ParamMap,
}

/// Current ACTIVE version with its lifecycle metadata (hash verified on read)
pub async fn active(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> AppResult<Json<VersionInfo>> {
    let config = &state.control.config;
    let active = config.active(&query.namespace)?;
    Ok(Json(config.get(&query.namespace, active.version)?))
}

pub async fn versions(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> AppResult<Json<Vec<VersionInfo>>> {
    Ok(Json(state.control.config.versions(&query.namespace)?))
}

/// Create a DRAFT version
pub async fn propose(
    State(state): State<AppState>,
    Json(req): Json<ProposeRequest>,
) -> AppResult<Json<VersionInfo>> {
    let author = req.author.unwrap_or_else(|| "api".to_string());
    if author.trim().is_empty() {
        return Err(AppError::validation("author must not be empty"));
    }

    let config = &state.control.config;
    let proposed = config.propose(&req.namespace, req.params, &author)?;
    Ok(Json(config.get(&req.namespace, proposed.version)?))
}

pub async fn validate(
    State(state): State<AppState>,
    Json(req): Json<VersionRequest>,
) -> AppResult<Json<ValidationOutcome>> {
    Ok(Json(state.control.config.validate(&req.namespace, req.version)?))
}

pub async fn deploy(
    State(state): State<AppState>,
    Json(req): Json<DeployRequest>,
) -> AppResult<Json<VersionInfo>> {
    let active = state.control.deploy(&req.namespace, req.version, req.strategy)?;
    Ok(Json(state.control.config.get(&req.namespace, active.version)?))
}

pub async fn rollback(
    State(state): State<AppState>,
    Json(req): Json<RollbackRequest>,
) -> AppResult<Json<VersionInfo>> {
    let active = state.control.rollback(&req.namespace, req.to_version)?;
    Ok(Json(state.control.config.get(&req.namespace, active.version)?))
}

pub async fn drift(
    State(state): State<AppState>,
    Json(req): Json<DriftRequest>,
) -> AppResult<Json<DriftReport>> {
    Ok(Json(state.control.config.detect_drift(&req.namespace, &req.observed)?))
}
