//! Input Resolution
//!
//! explicit > feature store > declared default, then clamp to [min, max].
//! Result is always complete and in-bounds for the descriptor.

use std::collections::BTreeMap;

use super::types::InputSource;
use crate::logic::features::FeatureBatch;
use crate::logic::model::{ModelDescriptor, ModelInputs};

/// Resolved inputs plus the tier each one came from
pub struct ResolvedInputs {
    pub values: ModelInputs,
    pub sources: BTreeMap<String, InputSource>,
}

pub fn resolve_inputs(
    descriptor: &ModelDescriptor,
    explicit: &BTreeMap<String, f64>,
    features: &FeatureBatch,
    use_stale_features: bool,
) -> ResolvedInputs {
    let mut values = ModelInputs::new();
    let mut sources = BTreeMap::new();

    for spec in &descriptor.inputs {
        let key = spec.key.as_str();

        // Non-finite explicit values count as absent
        let explicit_value = explicit.get(key).copied().filter(|v| v.is_finite());

        let (raw, source) = if let Some(v) = explicit_value {
            (v, InputSource::Explicit)
        } else if let Some(v) = features.fresh(key) {
            (v, InputSource::FeatureStore)
        } else if let Some(v) = stale_value(features, key, use_stale_features) {
            (v, InputSource::StaleFeature)
        } else {
            (spec.default, InputSource::Default)
        };

        let clamped = spec.clamp(raw);
        if clamped != raw {
            tracing::debug!(
                "Clamped input {}.{}: {} -> {}",
                descriptor.id,
                key,
                raw,
                clamped
            );
        }

        values.insert(key.to_string(), clamped);
        sources.insert(key.to_string(), source);
    }

    for key in explicit.keys() {
        if descriptor.input_spec(key).is_none() {
            tracing::debug!("Ignoring undeclared input '{}' for {}", key, descriptor.id);
        }
    }

    ResolvedInputs { values, sources }
}

fn stale_value(features: &FeatureBatch, key: &str, allowed: bool) -> Option<f64> {
    if !allowed || !features.stale.iter().any(|s| s == key) {
        return None;
    }
    features.values.get(key).map(|f| f.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::features::{Feature, FeatureKind, FeatureStore};
    use crate::logic::model::{ModelCategory, ParamSpec};
    use chrono::{Duration, Utc};

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("m", "M", ModelCategory::Capacity)
            .input("cpu", 0.0, 1.0, 0.65)
            .input("p99", 0.0, 10_000.0, 350.0)
            .input("ingest_rate", 0.0, 100_000.0, 1200.0)
    }

    fn explicit(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_three_tier_resolution() {
        let store = FeatureStore::new();
        store.put(Feature::new("cpu", 0.3, FeatureKind::RealTime, 60));
        store.put(Feature::new("p99", 410.0, FeatureKind::RealTime, 60));
        let batch = store.get_many(&["cpu", "p99", "ingest_rate"]);

        let resolved = resolve_inputs(&descriptor(), &explicit(&[("cpu", 0.9)]), &batch, false);

        assert_eq!(resolved.values["cpu"], 0.9);
        assert_eq!(resolved.sources["cpu"], InputSource::Explicit);
        assert_eq!(resolved.values["p99"], 410.0);
        assert_eq!(resolved.sources["p99"], InputSource::FeatureStore);
        assert_eq!(resolved.values["ingest_rate"], 1200.0);
        assert_eq!(resolved.sources["ingest_rate"], InputSource::Default);
    }

    #[test]
    fn test_out_of_range_and_non_finite_inputs() {
        let batch = FeatureBatch::default();
        let resolved = resolve_inputs(
            &descriptor(),
            &explicit(&[("cpu", 7.0), ("p99", f64::NAN), ("ingest_rate", -5.0)]),
            &batch,
            false,
        );

        assert_eq!(resolved.values["cpu"], 1.0);
        assert_eq!(resolved.values["p99"], 350.0);
        assert_eq!(resolved.sources["p99"], InputSource::Default);
        assert_eq!(resolved.values["ingest_rate"], 0.0);
    }

    #[test]
    fn test_stale_feature_policy() {
        let store = FeatureStore::new();
        let old = Utc::now() - Duration::seconds(120);
        store.put(Feature::new("cpu", 0.2, FeatureKind::RealTime, 60).computed_at(old));
        let batch = store.get_many(&["cpu"]);

        let strict = resolve_inputs(&descriptor(), &BTreeMap::new(), &batch, false);
        assert_eq!(strict.values["cpu"], 0.65);
        assert_eq!(strict.sources["cpu"], InputSource::Default);

        let lenient = resolve_inputs(&descriptor(), &BTreeMap::new(), &batch, true);
        assert_eq!(lenient.values["cpu"], 0.2);
        assert_eq!(lenient.sources["cpu"], InputSource::StaleFeature);
    }

    #[test]
    fn test_clamp_is_idempotent_and_monotonic() {
        let spec = ParamSpec::new("x", -10.0, 10.0, 0.0);
        let samples = [-1e9, -10.5, -10.0, -3.3, 0.0, 2.5, 10.0, 10.01, 1e12];

        for &x in &samples {
            let once = spec.clamp(x);
            assert_eq!(spec.clamp(once), once);
            assert!((-10.0..=10.0).contains(&once));
        }
        for pair in samples.windows(2) {
            assert!(spec.clamp(pair[0]) <= spec.clamp(pair[1]));
        }
    }
}
