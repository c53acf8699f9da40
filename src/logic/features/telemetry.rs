//! Telemetry Sources & Feature Refresh
//!
//! Feature producers. Sources (Prometheus-like, ClickHouse-like, log-derived)
//! only need to answer `fetch(name) -> Option<f64>`; the refresher turns those
//! answers into fresh `Feature`s and then evaluates derived features.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::store::{Feature, FeatureKind, FeatureStore};

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// External telemetry collaborator
pub trait TelemetrySource: Send + Sync {
    fn name(&self) -> &str;

    /// Kind assigned to features produced by this source
    fn kind(&self) -> FeatureKind;

    /// Feature names this source is polled for
    fn features(&self) -> Vec<String>;

    fn fetch(&self, feature: &str) -> Option<f64>;
}

/// In-memory source (tests, manual injection, replay)
pub struct StaticSource {
    name: String,
    kind: FeatureKind,
    values: RwLock<HashMap<String, f64>>,
}

impl StaticSource {
    pub fn new(name: &str, kind: FeatureKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn with(self, feature: &str, value: f64) -> Self {
        self.set(feature, value);
        self
    }

    pub fn set(&self, feature: &str, value: f64) {
        self.values.write().insert(feature.to_string(), value);
    }

    pub fn remove(&self, feature: &str) {
        self.values.write().remove(feature);
    }
}

impl TelemetrySource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> FeatureKind {
        self.kind
    }

    fn features(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn fetch(&self, feature: &str) -> Option<f64> {
        self.values.read().get(feature).copied()
    }
}

// ============================================================================
// DERIVED FEATURES
// ============================================================================

type DeriveFn = dyn Fn(&HashMap<String, f64>) -> Option<f64> + Send + Sync;

/// Feature computed from other features in the store
pub struct DerivedFeature {
    pub name: String,
    pub dependencies: Vec<String>,
    pub ttl_secs: u64,
    compute: Box<DeriveFn>,
}

impl DerivedFeature {
    pub fn new<F>(name: &str, dependencies: &[&str], ttl_secs: u64, compute: F) -> Self
    where
        F: Fn(&HashMap<String, f64>) -> Option<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
            ttl_secs,
            compute: Box::new(compute),
        }
    }
}

// ============================================================================
// REFRESHER
// ============================================================================

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub updated: Vec<String>,
    /// Source had no value for a declared feature
    pub absent: Vec<String>,
    pub derived: Vec<String>,
    /// Derived features skipped (missing/stale dependency or no value)
    pub skipped_derived: Vec<String>,
}

pub struct FeatureRefresher {
    sources: Vec<Arc<dyn TelemetrySource>>,
    derived: Vec<DerivedFeature>,
    ttl_secs: u64,
}

impl FeatureRefresher {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sources: Vec::new(),
            derived: Vec::new(),
            ttl_secs,
        }
    }

    pub fn add_source(&mut self, source: Arc<dyn TelemetrySource>) {
        tracing::info!("Registered telemetry source: {}", source.name());
        self.sources.push(source);
    }

    /// Derived features are evaluated in registration order, so a derived
    /// feature may depend on ones registered before it.
    pub fn add_derived(&mut self, feature: DerivedFeature) {
        tracing::info!(
            "Registered derived feature: {} (deps: {:?})",
            feature.name,
            feature.dependencies
        );
        self.derived.push(feature);
    }

    pub fn refresh(&self, store: &FeatureStore) -> RefreshReport {
        let mut report = RefreshReport::default();

        for source in &self.sources {
            for name in source.features() {
                match source.fetch(&name).filter(|v| v.is_finite()) {
                    Some(value) => {
                        store.put(Feature::new(&name, value, source.kind(), self.ttl_secs));
                        report.updated.push(name);
                    }
                    None => {
                        tracing::debug!("Source {} has no value for {}", source.name(), name);
                        report.absent.push(name);
                    }
                }
            }
        }

        for derived in &self.derived {
            let deps: Vec<&str> = derived.dependencies.iter().map(|s| s.as_str()).collect();
            let batch = store.get_many(&deps);

            let values: Option<HashMap<String, f64>> = derived
                .dependencies
                .iter()
                .map(|d| batch.fresh(d).map(|v| (d.clone(), v)))
                .collect();

            let computed = values
                .and_then(|vals| (derived.compute)(&vals))
                .filter(|v| v.is_finite());

            match computed {
                Some(value) => {
                    store.put(Feature::new(&derived.name, value, FeatureKind::Derived, derived.ttl_secs));
                    report.derived.push(derived.name.clone());
                }
                None => {
                    tracing::debug!(
                        "Derived feature {} skipped (missing: {:?}, stale: {:?})",
                        derived.name,
                        batch.missing,
                        batch.stale
                    );
                    report.skipped_derived.push(derived.name.clone());
                }
            }
        }

        report
    }
}
