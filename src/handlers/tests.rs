use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::config::Config;
use crate::logic::control::{ControlPlane, ControlSettings};
use crate::{create_router, AppState};

fn app() -> Router {
    let config = Config {
        port: 0,
        environment: "test".into(),
        log_format: "text".into(),
        violation_log_capacity: 100,
        escalation_threshold: 3,
        escalation_window_secs: 60,
        feature_ttl_secs: 300,
        refresh_interval_secs: 0,
        static_features: Vec::new(),
    };
    let control = ControlPlane::bootstrap(&ControlSettings::default()).unwrap();
    create_router(AppState {
        control: Arc::new(control),
        config,
    })
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_and_model_listing() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models"], 6);

    let (status, body) = call(&app, Method::GET, "/models", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "capacity_planning");
    assert_eq!(body.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_infer_capacity_model() {
    let app = app();
    let input = json!({ "ingest_rate": 1400, "cpu": 0.62, "p99": 380, "calendar_events": 0 });

    let (status, body) = call(&app, Method::POST, "/models/capacity_planning", Some(input)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_id"], "capacity_planning");
    assert_eq!(body["safety"]["verdict"], "SAFE");
    assert_eq!(body["safety"]["fallback_applied"], false);
    assert!(body["data"]["next_hour_workers"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_hyphenated_model_ids_and_list_alias() {
    let app = app();
    let input = json!({ "ingest_rate": 1400, "cpu": 0.62, "p99": 380, "calendar_events": 0 });

    let (status, body) = call(&app, Method::POST, "/models/capacity-planning", Some(input)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_id"], "capacity_planning");

    for id in ["tail-slo", "extreme-events", "regime-detection", "bayes-opt"] {
        let (status, _) = call(&app, Method::POST, &format!("/models/{}", id), Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{}", id);
    }

    let (status, listing) = call(&app, Method::GET, "/models/list", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_infer_worst_case_returns_fallback() {
    let app = app();
    let input = json!({ "load": 1.0, "infra": 1.0, "request_rate": 5000, "error_rate": 0.1 });

    let (status, body) = call(&app, Method::POST, "/models/tail_slo", Some(input)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["safety"]["verdict"], "UNSAFE");
    assert_eq!(body["safety"]["fallback_applied"], true);
    assert_eq!(body["data"]["action"], "admit_throttle");
    assert_eq!(body["data"]["autoscale_workers"], 0);
}

#[tokio::test]
async fn test_unknown_model_is_404() {
    let app = app();
    let (status, body) = call(&app, Method::POST, "/models/nope", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_emergency_mode_round_trip() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/safety/emergency-mode?enable=true&reason=incident-42",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["previous_mode"], "NORMAL");
    assert_eq!(body["mode"], "EMERGENCY");
    assert_eq!(body["reason"], "incident-42");

    let (_, body) = call(&app, Method::POST, "/models/regime_detection", Some(json!({}))).await;
    assert_eq!(body["safety"]["verdict"], "CRITICAL");
    assert_eq!(body["safety"]["fallback_applied"], true);

    let (_, health) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(health["status"], "degraded");

    let (_, body) = call(&app, Method::POST, "/safety/emergency-mode?enable=false", None).await;
    assert_eq!(body["previous_mode"], "EMERGENCY");
    assert_eq!(body["mode"], "NORMAL");
    assert_eq!(body["reason"], Value::Null);

    let (_, status_body) = call(&app, Method::GET, "/safety/status", None).await;
    assert_eq!(status_body["mode"], "NORMAL");
    assert_eq!(status_body["violation_count"], 1);
}

#[tokio::test]
async fn test_override_reports_previous_flag() {
    let app = app();
    let req = json!({ "category": "performance", "enabled": true });

    let (_, first) = call(&app, Method::POST, "/safety/override", Some(req.clone())).await;
    assert_eq!(first["previous"], false);
    let (_, second) = call(&app, Method::POST, "/safety/override", Some(req)).await;
    assert_eq!(second["previous"], true);

    let (_, status) = call(&app, Method::GET, "/safety/status", None).await;
    assert_eq!(status["overrides"], json!(["performance"]));
}

#[tokio::test]
async fn test_config_propose_validate_deploy_round_trip() {
    let app = app();
    let params = json!({ "max_workers": 25, "queue_size": 1200, "timeout_ms": 400 });

    let (_, before) = call(&app, Method::GET, "/config/active?namespace=autoscaler", None).await;
    let before_version = before["version"].as_u64().unwrap();

    let (status, draft) = call(
        &app,
        Method::POST,
        "/config/propose",
        Some(json!({ "namespace": "autoscaler", "params": params, "author": "ops" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(draft["state"], "DRAFT");
    let version = draft["version"].as_u64().unwrap();

    let (status, validated) = call(
        &app,
        Method::POST,
        "/config/validate",
        Some(json!({ "namespace": "autoscaler", "version": version })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(validated["state"], "APPROVED");
    assert_eq!(validated["impact"]["impact_level"], "medium");

    let (status, deployed) = call(
        &app,
        Method::POST,
        "/config/deploy",
        Some(json!({ "namespace": "autoscaler", "version": version, "strategy": { "type": "canary", "percentage": 10 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deployed["state"], "ACTIVE");

    let (_, active) = call(&app, Method::GET, "/config/active?namespace=autoscaler", None).await;
    assert_eq!(active["version"].as_u64().unwrap(), before_version + 1);
    assert_eq!(active["params"], params);
    assert_eq!(active["state"], "ACTIVE");
    assert_eq!(active["deployment"]["strategy"]["type"], "canary");

    let (status, rolled) = call(
        &app,
        Method::POST,
        "/config/rollback",
        Some(json!({ "namespace": "autoscaler" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rolled["version"].as_u64().unwrap(), before_version);

    let (_, versions) = call(&app, Method::GET, "/config/versions?namespace=autoscaler", None).await;
    assert_eq!(versions[1]["state"], "ROLLED_BACK");
}

#[tokio::test]
async fn test_config_validation_errors_are_listed() {
    let app = app();
    let (_, draft) = call(
        &app,
        Method::POST,
        "/config/propose",
        Some(json!({ "namespace": "autoscaler", "params": { "max_workers": 9000 } })),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/config/validate",
        Some(json!({ "namespace": "autoscaler", "version": draft["version"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);

    // Still DRAFT, so deploy is a lifecycle conflict
    let (status, _) = call(
        &app,
        Method::POST,
        "/config/deploy",
        Some(json!({ "namespace": "autoscaler", "version": draft["version"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_config_drift_and_unknown_namespace() {
    let app = app();
    let observed = json!({ "max_workers": 20, "queue_size": 1000, "timeout_ms": 750 });

    let (status, report) = call(
        &app,
        Method::POST,
        "/config/drift",
        Some(json!({ "namespace": "autoscaler", "observed": observed })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["drift_detected"], true);
    assert_eq!(report["drifts"][0]["field"], "timeout_ms");

    let (status, _) = call(&app, Method::GET, "/config/active?namespace=missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feature_ingest_lookup_and_invalidate() {
    let app = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/features",
        Some(json!({ "name": "cpu", "value": 0.91 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["freshness"], "fresh");
    assert_eq!(body["kind"], "REAL_TIME");

    let (_, body) = call(&app, Method::GET, "/features/cpu", None).await;
    assert_eq!(body["value"], 0.91);

    let (_, listing) = call(&app, Method::GET, "/features", None).await;
    assert_eq!(listing.as_array().unwrap().len(), 1);

    // Store value fills the missing cpu input
    let (_, inference) = call(
        &app,
        Method::POST,
        "/models/capacity_planning",
        Some(json!({ "ingest_rate": 1400 })),
    )
    .await;
    assert_eq!(inference["data"]["action"], "scale_up_with_approval");

    let (status, _) = call(&app, Method::DELETE, "/features/cpu", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::GET, "/features/cpu", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feature_ingest_rejects_empty_name() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/features",
        Some(json!({ "name": "  ", "value": 1.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}
