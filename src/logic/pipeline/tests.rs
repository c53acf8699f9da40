use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use super::*;
use crate::logic::defaults;
use crate::logic::features::{Feature, FeatureKind};
use crate::logic::model::{FnModel, ModelCategory, ModelDescriptor, OutputValue};
use crate::logic::safety::{ControllerMode, SafetyLevel, SafetyPolicy, INFERENCE_FAILURE_VIOLATION};

fn pipeline() -> InferencePipeline {
    let registry = Arc::new(ModelRegistry::new());
    defaults::register_models(&registry).unwrap();
    let safety = Arc::new(SafetyController::default());
    defaults::register_safety(&safety);
    InferencePipeline::new(registry, Arc::new(FeatureStore::new()), safety)
}

fn inputs(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn register_flaky(p: &InferencePipeline) {
    let descriptor = ModelDescriptor::new("flaky", "Flaky", ModelCategory::Performance)
        .input("load", 0.0, 1.0, 0.5)
        .output("action", "Action");
    let model = FnModel::new(&["action"], |_: &ModelInputs| -> Result<ModelOutput, InferenceError> {
        Err(InferenceError("division by zero".into()))
    });
    p.registry().register(descriptor, Arc::new(model)).unwrap();
}

#[test]
fn test_capacity_reference_scenario() {
    let p = pipeline();
    let result = p
        .run(
            "capacity_planning",
            &inputs(&[("ingest_rate", 1400.0), ("cpu", 0.62), ("p99", 380.0), ("calendar_events", 0.0)]),
        )
        .unwrap();

    assert!(!result.is_error());
    assert!(matches!(result.safety.level, SafetyLevel::Safe | SafetyLevel::Warning));
    assert!(!result.safety.fallback_applied());

    let workers = result.data["next_hour_workers"].as_f64().unwrap();
    assert!((1.0..=100.0).contains(&workers));
    assert_eq!(
        result.data["next_day_target"].as_f64().unwrap(),
        (workers * 24.0 * 0.85).round()
    );
    assert!(result.input_sources.values().all(|s| *s == InputSource::Explicit));
}

#[test]
fn test_tail_slo_worst_case_is_replaced_by_fallback() {
    let p = pipeline();
    let result = p
        .run(
            "tail_slo",
            &inputs(&[("load", 1.0), ("infra", 1.0), ("request_rate", 5000.0), ("error_rate", 0.1)]),
        )
        .unwrap();

    assert!(result.safety.level >= SafetyLevel::Warning);
    assert_eq!(result.safety.level, SafetyLevel::Unsafe);
    assert!(result
        .safety
        .violations
        .contains(&"autoscale_within_limits".to_string()));
    assert_eq!(result.data, p.safety().fallback(ModelCategory::Performance));
    assert_eq!(result.data["autoscale_workers"], OutputValue::Integer(0));
}

#[test]
fn test_unknown_model_is_an_error() {
    let p = pipeline();
    let err = p.run("does_not_exist", &BTreeMap::new()).unwrap_err();
    assert!(matches!(err, RegistryError::UnknownModel(id) if id == "does_not_exist"));
}

#[test]
fn test_out_of_range_inputs_are_clamped_before_inference() {
    let p = pipeline();
    let result = p
        .run("tail_slo", &inputs(&[("load", 7.5), ("error_rate", f64::NAN)]))
        .unwrap();

    assert_eq!(result.inputs["load"], 1.0);
    assert_eq!(result.inputs["error_rate"], 0.01);
    assert_eq!(result.input_sources["error_rate"], InputSource::Default);
}

#[test]
fn test_model_failure_returns_critical_fallback() {
    let p = pipeline();
    register_flaky(&p);

    let result = p.run("flaky", &BTreeMap::new()).unwrap();
    assert!(result.is_error());
    assert!(result.error.as_deref().unwrap().contains("division by zero"));
    assert_eq!(result.safety.level, SafetyLevel::Critical);
    assert_eq!(
        result.safety.violations,
        vec![INFERENCE_FAILURE_VIOLATION.to_string()]
    );
    assert_eq!(result.data, p.safety().fallback(ModelCategory::Performance));
}

#[test]
fn test_model_panic_is_contained() {
    let p = pipeline();
    let descriptor = ModelDescriptor::new("panicky", "Panicky", ModelCategory::Risk).output("alert_level", "Alert");
    let model = FnModel::new(&["alert_level"], |_: &ModelInputs| -> Result<ModelOutput, InferenceError> {
        panic!("kaboom")
    });
    p.registry().register(descriptor, Arc::new(model)).unwrap();

    let result = p.run("panicky", &BTreeMap::new()).unwrap();
    assert!(result.error.as_deref().unwrap().contains("kaboom"));
    assert_eq!(result.data, p.safety().fallback(ModelCategory::Risk));

    // Pipeline still serves other models afterwards
    assert!(!p.run("regime_detection", &BTreeMap::new()).unwrap().is_error());
}

#[test]
fn test_output_schema_drift_is_a_failure() {
    let p = pipeline();
    let descriptor = ModelDescriptor::new("drifty", "Drifty", ModelCategory::Tuning).output("action", "Action");
    let model = FnModel::new(&["action"], |_: &ModelInputs| -> Result<ModelOutput, InferenceError> {
        let mut out = ModelOutput::new();
        out.insert("unexpected".into(), OutputValue::Integer(1));
        Ok(out)
    });
    p.registry().register(descriptor, Arc::new(model)).unwrap();

    let result = p.run("drifty", &BTreeMap::new()).unwrap();
    assert!(result.error.as_deref().unwrap().contains("do not match"));
    assert_eq!(result.data, p.safety().fallback(ModelCategory::Tuning));
}

#[test]
fn test_feature_store_fills_missing_inputs() {
    let p = pipeline();
    p.features().put(Feature::new("cpu", 0.91, FeatureKind::RealTime, 300));

    let result = p.run("capacity_planning", &inputs(&[("ingest_rate", 1400.0)])).unwrap();
    assert_eq!(result.inputs["cpu"], 0.91);
    assert_eq!(result.input_sources["cpu"], InputSource::FeatureStore);
    assert_eq!(result.input_sources["ingest_rate"], InputSource::Explicit);
    assert_eq!(result.input_sources["p99"], InputSource::Default);
    assert_eq!(result.data["action"].as_str(), Some("scale_up_with_approval"));
}

#[test]
fn test_stale_features_follow_policy() {
    let p = pipeline();
    p.features().put(
        Feature::new("cpu", 0.91, FeatureKind::RealTime, 10).computed_at(Utc::now() - Duration::seconds(60)),
    );

    let result = p.run("capacity_planning", &BTreeMap::new()).unwrap();
    assert_eq!(result.input_sources["cpu"], InputSource::Default);
    assert_eq!(result.inputs["cpu"], 0.65);

    p.apply_policy(PipelinePolicy { use_stale_features: true });
    let result = p.run("capacity_planning", &BTreeMap::new()).unwrap();
    assert_eq!(result.input_sources["cpu"], InputSource::StaleFeature);
    assert_eq!(result.inputs["cpu"], 0.91);
}

#[test]
fn test_repeated_failures_trip_emergency_for_all_models() {
    let p = pipeline();
    register_flaky(&p);
    assert_eq!(p.safety().policy(), SafetyPolicy::default());

    for _ in 0..3 {
        p.run("flaky", &BTreeMap::new()).unwrap();
    }
    assert_eq!(p.safety().mode(), ControllerMode::Emergency);

    let result = p
        .run(
            "capacity_planning",
            &inputs(&[("ingest_rate", 1400.0), ("cpu", 0.62), ("p99", 380.0)]),
        )
        .unwrap();
    assert_eq!(result.safety.level, SafetyLevel::Critical);
    assert_eq!(result.data, p.safety().fallback(ModelCategory::Capacity));
}

#[test]
fn test_concurrent_runs_share_components() {
    let p = Arc::new(pipeline());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let p = Arc::clone(&p);
            std::thread::spawn(move || {
                let rate = 500.0 + 100.0 * i as f64;
                for _ in 0..10 {
                    let r = p.run("capacity_planning", &inputs(&[("ingest_rate", rate)])).unwrap();
                    assert!(!r.is_error());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(p.safety().status().violation_count, 40);
}
