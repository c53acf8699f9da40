//! Default Wiring
//!
//! Built-in models, their safety constraints and fallbacks, config namespace
//! schemas and derived features. Called once from process bootstrap; tests
//! call the same functions on isolated instances.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::logic::config::{ConfigError, ConfigManager, FieldSpec, NamespaceSchema, ParamMap, ParamValue};
use crate::logic::features::{DerivedFeature, FeatureRefresher};
use crate::logic::model::{builtin_models, ModelCategory, ModelOutput, ModelRegistry, OutputValue, RegistryError};
use crate::logic::pipeline::PipelinePolicy;
use crate::logic::safety::{Constraint, SafetyController, SafetyPolicy};

// ============================================================================
// CONSTANTS
// ============================================================================

pub const SAFETY_NAMESPACE: &str = "safety";
pub const PIPELINE_NAMESPACE: &str = "pipeline";
pub const AUTOSCALER_NAMESPACE: &str = "autoscaler";

/// Author tag for versions created at startup
pub const BOOTSTRAP_AUTHOR: &str = "bootstrap";

/// Upper bounds of the `safety` namespace fields
pub const MAX_ESCALATION_THRESHOLD: i64 = 100;
pub const MAX_ESCALATION_WINDOW_SECS: i64 = 3600;

/// Normalizers for the load score
const LOAD_REQUEST_RATE_SCALE: f64 = 5000.0;
const LOAD_P95_SCALE_MS: f64 = 1000.0;

/// Anomaly score inputs
const ANOMALY_ERROR_RATE: f64 = 0.05;
const ANOMALY_P99_BASELINE_MS: f64 = 500.0;
const ANOMALY_LOW_TRAFFIC_RPS: f64 = 100.0;

/// Business hours (UTC), Monday to Friday
const BUSINESS_HOURS: std::ops::Range<u32> = 9..17;

// ============================================================================
// MODELS
// ============================================================================

pub fn register_models(registry: &ModelRegistry) -> Result<(), RegistryError> {
    for (descriptor, model) in builtin_models() {
        registry.register(descriptor, model)?;
    }
    Ok(())
}

// ============================================================================
// SAFETY
// ============================================================================

pub fn default_constraints() -> Vec<Constraint> {
    use ModelCategory::*;

    vec![
        // Capacity
        Constraint::range("worker_count_reasonable", Capacity, "next_hour_workers", 1.0, 100.0)
            .describe("Worker count must be between 1 and 100"),
        Constraint::at_most("worker_count_ceiling", Capacity, "next_hour_workers", 500.0)
            .invariant()
            .describe("Worker count must never exceed 500"),
        Constraint::range("queue_capacity_reasonable", Capacity, "queue_capacity", 50.0, 10_000.0)
            .advisory()
            .describe("Queue capacity should be between 50 and 10000"),
        Constraint::ordered("confidence_band_ordered", Capacity, "confidence_lower", "confidence_upper")
            .describe("Lower confidence bound must not exceed the upper bound"),
        // Performance
        Constraint::at_most("latency_predictions_reasonable", Performance, "p99_pred", 5000.0)
            .advisory()
            .describe("P99 prediction seems unreasonably high (>5s)"),
        Constraint::at_most("autoscale_within_limits", Performance, "autoscale_workers", 50.0)
            .describe("Autoscale recommendation exceeds limit (50 workers)"),
        Constraint::at_most("autoscale_absolute_ceiling", Performance, "autoscale_workers", 200.0)
            .invariant()
            .describe("Autoscale target exceeds absolute ceiling (200 workers)"),
        Constraint::ordered("p95_below_p99", Performance, "p95_pred", "p99_pred")
            .describe("P95 prediction must not exceed P99"),
        Constraint::ordered("p99_below_p99_9", Performance, "p99_pred", "p99_9_pred")
            .describe("P99 prediction must not exceed P99.9"),
        // Risk
        Constraint::range("tail_probability_bounded", Risk, "tail_probability", 0.0, 1.0)
            .describe("Tail probability must be a probability"),
        Constraint::requires(
            "require_persistence",
            Risk,
            ("alert_level", "critical"),
            ("persistence_required", "yes"),
        )
        .advisory()
        .describe("Critical alerts should require persistence checks"),
        // Detection
        Constraint::range("change_probability_bounded", Detection, "change_probability", 0.0, 1.0)
            .describe("Change probability must be a probability"),
        Constraint::at_least("run_length_non_negative", Detection, "run_length", 0.0)
            .describe("Run length cannot be negative"),
        // Tuning
        Constraint::range("canary_percentage_safe", Tuning, "canary_percentage", 0.0, 10.0)
            .invariant()
            .describe("Canary percentage must be between 0-10%"),
        Constraint::requires(
            "freeze_on_low_metric",
            Tuning,
            ("canary_health", "low"),
            ("freeze_on_anomaly", "yes"),
        )
        .describe("Should freeze exploration when canary metric is very low"),
        // Optimization
        Constraint::range("timeout_reasonable", Optimization, "suggested_timeout_ms", 100.0, 30_000.0)
            .describe("Suggested timeout should be between 100ms and 30s"),
        Constraint::range("batch_size_reasonable", Optimization, "suggested_batch_size", 1.0, 512.0)
            .describe("Suggested batch size should be between 1 and 512"),
    ]
}

fn output(pairs: &[(&str, OutputValue)]) -> ModelOutput {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Conservative per-category substitutes
pub fn default_fallbacks() -> Vec<(ModelCategory, ModelOutput)> {
    use OutputValue::{Integer, Text};

    vec![
        (
            ModelCategory::Capacity,
            output(&[
                ("next_hour_workers", Integer(5)),
                ("queue_capacity", Integer(200)),
                ("action", Text("maintain_current".into())),
                ("guardrail", Text("safety_fallback".into())),
            ]),
        ),
        (
            ModelCategory::Performance,
            output(&[
                ("action", Text("admit_throttle".into())),
                ("autoscale_workers", Integer(0)),
                ("recommendation", Text("manual_review_required".into())),
            ]),
        ),
        (
            ModelCategory::Tuning,
            output(&[
                ("best_config_id", Integer(1)),
                ("action", Text("exploit".into())),
                ("reason", Text("safety_fallback".into())),
            ]),
        ),
        (
            ModelCategory::Risk,
            output(&[
                ("alert_level", Text("warning".into())),
                ("persistence_required", Text("yes".into())),
            ]),
        ),
    ]
}

pub fn register_safety(safety: &SafetyController) {
    for constraint in default_constraints() {
        safety.register_constraint(constraint);
    }
    for (category, fallback) in default_fallbacks() {
        safety.set_fallback(category, fallback);
    }
}

// ============================================================================
// CONFIG NAMESPACES
// ============================================================================

pub fn namespace_schemas() -> Vec<NamespaceSchema> {
    vec![
        NamespaceSchema::new(SAFETY_NAMESPACE)
            .field(FieldSpec::int("escalation_threshold", 1, MAX_ESCALATION_THRESHOLD))
            .field(FieldSpec::int("escalation_window_secs", 1, MAX_ESCALATION_WINDOW_SECS)),
        NamespaceSchema::new(PIPELINE_NAMESPACE).field(FieldSpec::boolean("use_stale_features")),
        NamespaceSchema::new(AUTOSCALER_NAMESPACE)
            .field(FieldSpec::int("max_workers", 1, 500).high_risk())
            .field(FieldSpec::int("queue_size", 10, 100_000).high_risk())
            .field(FieldSpec::int("timeout_ms", 50, 60_000).high_risk())
            .field(FieldSpec::float("target_utilization", 0.1, 0.95).optional()),
    ]
}

pub fn register_namespaces(config: &ConfigManager) -> Result<(), ConfigError> {
    for schema in namespace_schemas() {
        config.register_namespace(schema)?;
    }
    Ok(())
}

pub fn safety_params(policy: &SafetyPolicy) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(
        "escalation_threshold".into(),
        ParamValue::Int(policy.escalation_threshold as i64),
    );
    params.insert(
        "escalation_window_secs".into(),
        ParamValue::Int(policy.escalation_window_secs),
    );
    params
}

/// Missing or mistyped keys keep the current value
pub fn safety_policy_from(params: &ParamMap, current: SafetyPolicy) -> SafetyPolicy {
    SafetyPolicy {
        escalation_threshold: params
            .get("escalation_threshold")
            .and_then(ParamValue::as_i64)
            .map(|v| v.max(1) as usize)
            .unwrap_or(current.escalation_threshold),
        escalation_window_secs: params
            .get("escalation_window_secs")
            .and_then(ParamValue::as_i64)
            .unwrap_or(current.escalation_window_secs),
    }
}

pub fn pipeline_params(policy: &PipelinePolicy) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(
        "use_stale_features".into(),
        ParamValue::Bool(policy.use_stale_features),
    );
    params
}

pub fn pipeline_policy_from(params: &ParamMap, current: PipelinePolicy) -> PipelinePolicy {
    PipelinePolicy {
        use_stale_features: params
            .get("use_stale_features")
            .and_then(ParamValue::as_bool)
            .unwrap_or(current.use_stale_features),
    }
}

pub fn autoscaler_params() -> ParamMap {
    let mut params = ParamMap::new();
    params.insert("max_workers".into(), ParamValue::Int(20));
    params.insert("queue_size".into(), ParamValue::Int(1000));
    params.insert("timeout_ms".into(), ParamValue::Int(500));
    params
}

// ============================================================================
// FEATURES
// ============================================================================

/// Weighted utilisation in [0, 1]. Published as `load`, the tail-latency
/// model's input.
pub fn load_score(cpu: f64, request_rate: f64, p95_ms: f64) -> f64 {
    (0.4 * cpu + 0.3 * request_rate / LOAD_REQUEST_RATE_SCALE + 0.3 * p95_ms / LOAD_P95_SCALE_MS)
        .clamp(0.0, 1.0)
}

/// Error burst, latency excess and traffic collapse, in [0, 1]
pub fn anomaly_score(error_rate: f64, p99_ms: f64, request_rate: f64) -> f64 {
    let errors = (error_rate / ANOMALY_ERROR_RATE).min(1.0);
    let latency = ((p99_ms - ANOMALY_P99_BASELINE_MS) / ANOMALY_P99_BASELINE_MS).clamp(0.0, 1.0);
    let low_traffic = if request_rate < ANOMALY_LOW_TRAFFIC_RPS { 1.0 } else { 0.0 };
    (0.5 * errors + 0.3 * latency + 0.2 * low_traffic).clamp(0.0, 1.0)
}

/// `hour_of_day` (0-23), `day_of_week` (0 = Monday) and `is_business_hours`
pub fn calendar_features(now: DateTime<Utc>) -> [(&'static str, f64); 3] {
    let hour = now.hour();
    let weekday = now.weekday().num_days_from_monday();
    let business = weekday < 5 && BUSINESS_HOURS.contains(&hour);
    [
        ("hour_of_day", hour as f64),
        ("day_of_week", weekday as f64),
        ("is_business_hours", if business { 1.0 } else { 0.0 }),
    ]
}

fn calendar_value(name: &str) -> Option<f64> {
    calendar_features(Utc::now())
        .into_iter()
        .find(|(feature, _)| *feature == name)
        .map(|(_, value)| value)
}

pub fn register_derived(refresher: &mut FeatureRefresher, ttl_secs: u64) {
    refresher.add_derived(DerivedFeature::new(
        "load",
        &["cpu", "request_rate", "p95"],
        ttl_secs,
        |v| Some(load_score(v["cpu"], v["request_rate"], v["p95"])),
    ));
    refresher.add_derived(DerivedFeature::new(
        "anomaly_score",
        &["error_rate", "p99", "request_rate"],
        ttl_secs,
        |v| Some(anomaly_score(v["error_rate"], v["p99"], v["request_rate"])),
    ));
    for name in ["hour_of_day", "day_of_week", "is_business_hours"] {
        refresher.add_derived(DerivedFeature::new(name, &[], ttl_secs, move |_| calendar_value(name)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::logic::features::{FeatureKind, FeatureStore, RefreshReport, StaticSource};
    use crate::logic::model::ModelRegistry;

    fn refreshed(source: StaticSource) -> (FeatureStore, RefreshReport) {
        let mut refresher = FeatureRefresher::new(300);
        refresher.add_source(Arc::new(source));
        register_derived(&mut refresher, 300);
        let store = FeatureStore::new();
        let report = refresher.refresh(&store);
        (store, report)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_constraints_cover_descriptor_guardrails() {
        let registry = ModelRegistry::new();
        register_models(&registry).unwrap();

        let names: Vec<String> = default_constraints().into_iter().map(|c| c.name).collect();
        for descriptor in registry.list() {
            for guardrail in &descriptor.guardrails {
                assert!(names.contains(guardrail), "no constraint for guardrail {}", guardrail);
            }
        }
    }

    #[test]
    fn test_builtin_params_pass_their_schemas() {
        let schemas = namespace_schemas();
        let check = |ns: &str, params: &ParamMap| {
            let schema = schemas.iter().find(|s| s.namespace == ns).unwrap();
            assert!(schema.check(params).is_empty(), "{}: {:?}", ns, schema.check(params));
        };

        check(SAFETY_NAMESPACE, &safety_params(&SafetyPolicy::default()));
        check(PIPELINE_NAMESPACE, &pipeline_params(&PipelinePolicy::default()));
        check(AUTOSCALER_NAMESPACE, &autoscaler_params());
    }

    #[test]
    fn test_policy_round_trip_through_params() {
        let policy = SafetyPolicy {
            escalation_threshold: 5,
            escalation_window_secs: 120,
        };
        assert_eq!(safety_policy_from(&safety_params(&policy), SafetyPolicy::default()), policy);

        let pipeline = PipelinePolicy { use_stale_features: true };
        assert_eq!(pipeline_policy_from(&pipeline_params(&pipeline), PipelinePolicy::default()), pipeline);
    }

    #[test]
    fn test_load_score_weighting() {
        assert_close(load_score(0.5, 2500.0, 300.0), 0.44);
        assert_close(load_score(0.0, 0.0, 0.0), 0.0);
        assert_close(load_score(1.0, 20_000.0, 4000.0), 1.0);
    }

    #[test]
    fn test_anomaly_score_components() {
        // Healthy traffic
        assert_close(anomaly_score(0.0, 300.0, 1000.0), 0.0);
        // Half the error budget, p99 at 750ms
        assert_close(anomaly_score(0.025, 750.0, 1000.0), 0.25 + 0.15);
        // Everything firing
        assert_close(anomaly_score(0.5, 5000.0, 10.0), 1.0);
    }

    #[test]
    fn test_calendar_features() {
        // 2024-03-06 was a Wednesday
        let wednesday = Utc.with_ymd_and_hms(2024, 3, 6, 10, 30, 0).unwrap();
        assert_eq!(
            calendar_features(wednesday),
            [("hour_of_day", 10.0), ("day_of_week", 2.0), ("is_business_hours", 1.0)]
        );

        let evening = Utc.with_ymd_and_hms(2024, 3, 6, 17, 0, 0).unwrap();
        assert_eq!(calendar_features(evening)[2], ("is_business_hours", 0.0));

        let sunday = Utc.with_ymd_and_hms(2024, 3, 10, 11, 0, 0).unwrap();
        assert_eq!(calendar_features(sunday)[1], ("day_of_week", 6.0));
        assert_eq!(calendar_features(sunday)[2], ("is_business_hours", 0.0));
    }

    #[test]
    fn test_refresher_derives_load_score() {
        let (store, report) = refreshed(
            StaticSource::new("prometheus", FeatureKind::RealTime)
                .with("cpu", 0.5)
                .with("request_rate", 2500.0)
                .with("p95", 300.0),
        );
        assert!(report.derived.contains(&"load".to_string()));
        let load = store.get("load").unwrap();
        assert_eq!(load.kind, FeatureKind::Derived);
        assert_close(load.value, 0.44);
    }

    #[test]
    fn test_refresher_derives_anomaly_score() {
        let (store, report) = refreshed(
            StaticSource::new("prometheus", FeatureKind::RealTime)
                .with("error_rate", 0.1)
                .with("p99", 1000.0)
                .with("request_rate", 50.0),
        );
        assert!(report.derived.contains(&"anomaly_score".to_string()));
        // cpu and p95 absent
        assert!(report.skipped_derived.contains(&"load".to_string()));
        assert_close(store.get("anomaly_score").unwrap().value, 1.0);
    }

    #[test]
    fn test_refresher_publishes_calendar_features_without_sources() {
        let (store, report) = refreshed(StaticSource::new("empty", FeatureKind::Batch));

        for name in ["hour_of_day", "day_of_week", "is_business_hours"] {
            assert!(report.derived.contains(&name.to_string()), "{} not derived", name);
            assert_eq!(store.get(name).unwrap().kind, FeatureKind::Derived);
        }
        let hour = store.get("hour_of_day").unwrap().value;
        assert!((0.0..24.0).contains(&hour));
        let day = store.get("day_of_week").unwrap().value;
        assert!((0.0..7.0).contains(&day));
        let business = store.get("is_business_hours").unwrap().value;
        assert!(business == 0.0 || business == 1.0);
    }
}
