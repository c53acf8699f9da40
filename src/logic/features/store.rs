//! Feature Store
//!
//! Cache of named feature values with freshness metadata.
//! Features are replaced wholesale on refresh, never mutated in place.
//! Absence and staleness are normal answers, not errors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// TTL ceiling (10 years) so expiry arithmetic stays in range
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Where a feature value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureKind {
    /// Live metrics (Prometheus-like)
    RealTime,
    /// Pre-computed from history (ClickHouse-like)
    Batch,
    /// Computed from other features
    Derived,
}

/// A named scalar value with its compute time and TTL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
    pub kind: FeatureKind,
    pub ttl_secs: u64,
}

impl Feature {
    pub fn new(name: &str, value: f64, kind: FeatureKind, ttl_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            value,
            computed_at: Utc::now(),
            kind,
            ttl_secs,
        }
    }

    /// Override compute time (replays, backfills)
    pub fn computed_at(mut self, at: DateTime<Utc>) -> Self {
        self.computed_at = at;
        self
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.computed_at + Duration::seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64)
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }
}

/// Freshness of a single feature name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale,
    Missing,
}

/// Result of a multi-feature lookup. Never partially fails.
#[derive(Debug, Clone, Default)]
pub struct FeatureBatch {
    pub values: HashMap<String, Arc<Feature>>,
    /// Present but past TTL (also included in `values`)
    pub stale: Vec<String>,
    pub missing: Vec<String>,
}

impl FeatureBatch {
    /// Fresh value for a name, if any
    pub fn fresh(&self, name: &str) -> Option<f64> {
        if self.stale.iter().any(|s| s == name) {
            return None;
        }
        self.values.get(name).map(|f| f.value)
    }
}

/// Listing entry for API / diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub name: String,
    pub value: f64,
    pub kind: FeatureKind,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub stale: bool,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Only raised at the operator-facing edges (`require`, `ingest`);
/// lookups used by inference report absence as data instead.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("feature '{0}' not found")]
    NotFound(String),

    #[error("feature '{name}' has non-finite value {value}")]
    NonFinite { name: String, value: f64 },

    #[error("feature name must not be empty")]
    EmptyName,
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Default)]
struct StoreInner {
    features: HashMap<String, Arc<Feature>>,
    /// Freshness index: name -> expiry
    expiries: HashMap<String, DateTime<Utc>>,
}

#[derive(Default)]
pub struct FeatureStore {
    inner: RwLock<StoreInner>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Feature>> {
        let feature = self.inner.read().features.get(name).cloned();
        if feature.is_some() {
            tracing::debug!("Feature cache hit: {}", name);
        }
        feature
    }

    /// Overwrite by name
    pub fn put(&self, feature: Feature) {
        let expiry = feature.expires_at();
        let name = feature.name.clone();
        let mut inner = self.inner.write();
        inner.expiries.insert(name.clone(), expiry);
        inner.features.insert(name, Arc::new(feature));
    }

    pub fn require(&self, name: &str) -> Result<Arc<Feature>, FeatureError> {
        self.get(name)
            .ok_or_else(|| FeatureError::NotFound(name.to_string()))
    }

    /// Checked `put` for externally pushed values
    pub fn ingest(&self, feature: Feature) -> Result<(), FeatureError> {
        if feature.name.trim().is_empty() {
            return Err(FeatureError::EmptyName);
        }
        if !feature.value.is_finite() {
            return Err(FeatureError::NonFinite {
                name: feature.name,
                value: feature.value,
            });
        }
        tracing::debug!("Ingested feature {} = {}", feature.name, feature.value);
        self.put(feature);
        Ok(())
    }

    pub fn get_many(&self, names: &[&str]) -> FeatureBatch {
        let now = Utc::now();
        let inner = self.inner.read();
        let mut batch = FeatureBatch::default();

        for &name in names {
            match inner.features.get(name) {
                Some(feature) => {
                    if Self::expired(&inner, name, now) {
                        batch.stale.push(name.to_string());
                    }
                    batch.values.insert(name.to_string(), Arc::clone(feature));
                }
                None => batch.missing.push(name.to_string()),
            }
        }

        batch
    }

    /// None when the feature is missing
    pub fn is_stale(&self, name: &str) -> Option<bool> {
        match self.freshness(name) {
            Freshness::Fresh => Some(false),
            Freshness::Stale => Some(true),
            Freshness::Missing => None,
        }
    }

    pub fn freshness(&self, name: &str) -> Freshness {
        let inner = self.inner.read();
        if !inner.features.contains_key(name) {
            return Freshness::Missing;
        }
        if Self::expired(&inner, name, Utc::now()) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    fn expired(inner: &StoreInner, name: &str, now: DateTime<Utc>) -> bool {
        inner.expiries.get(name).map_or(true, |expiry| now >= *expiry)
    }

    /// Drop a single feature, forcing recompute on next refresh
    pub fn invalidate(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        inner.expiries.remove(name);
        let removed = inner.features.remove(name).is_some();
        if removed {
            tracing::info!("Invalidated feature: {}", name);
        }
        removed
    }

    pub fn invalidate_all(&self) {
        let mut inner = self.inner.write();
        inner.features.clear();
        inner.expiries.clear();
        tracing::info!("Invalidated all features");
    }

    /// TTL garbage collection. Returns number of features evicted.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .expiries
            .iter()
            .filter(|(_, expiry)| now >= **expiry)
            .map(|(name, _)| name.clone())
            .collect();

        for name in &expired {
            inner.expiries.remove(name);
            inner.features.remove(name);
        }

        if !expired.is_empty() {
            tracing::debug!("Purged {} expired features", expired.len());
        }
        expired.len()
    }

    /// Summaries sorted by name
    pub fn list(&self) -> Vec<FeatureSummary> {
        let now = Utc::now();
        let inner = self.inner.read();
        let mut list: Vec<FeatureSummary> = inner
            .features
            .values()
            .map(|f| FeatureSummary {
                name: f.name.clone(),
                value: f.value,
                kind: f.kind,
                computed_at: f.computed_at,
                expires_at: f.expires_at(),
                stale: f.is_stale_at(now),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn len(&self) -> usize {
        self.inner.read().features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aged(name: &str, value: f64, ttl: u64, age_secs: i64) -> Feature {
        Feature::new(name, value, FeatureKind::RealTime, ttl)
            .computed_at(Utc::now() - Duration::seconds(age_secs))
    }

    #[test]
    fn test_put_get_overwrite() {
        let store = FeatureStore::new();
        store.put(Feature::new("cpu", 0.4, FeatureKind::RealTime, 60));
        store.put(Feature::new("cpu", 0.9, FeatureKind::RealTime, 60));

        assert_eq!(store.get("cpu").unwrap().value, 0.9);
        assert!(store.get("p99").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_staleness() {
        let store = FeatureStore::new();
        store.put(aged("fresh", 1.0, 300, 10));
        store.put(aged("old", 1.0, 30, 120));

        assert_eq!(store.is_stale("fresh"), Some(false));
        assert_eq!(store.is_stale("old"), Some(true));
        assert_eq!(store.is_stale("nope"), None);
        assert_eq!(store.freshness("nope"), Freshness::Missing);
    }

    #[test]
    fn test_get_many_reports_missing_and_stale() {
        let store = FeatureStore::new();
        store.put(aged("cpu", 0.5, 300, 0));
        store.put(aged("p99", 380.0, 10, 60));

        let batch = store.get_many(&["cpu", "p99", "ingest_rate"]);
        assert_eq!(batch.values.len(), 2);
        assert_eq!(batch.missing, vec!["ingest_rate".to_string()]);
        assert_eq!(batch.stale, vec!["p99".to_string()]);
        assert_eq!(batch.fresh("cpu"), Some(0.5));
        assert_eq!(batch.fresh("p99"), None);
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let store = FeatureStore::new();
        store.put(Feature::new("x", 1.0, FeatureKind::Batch, 0));
        assert_eq!(store.is_stale("x"), Some(true));
    }

    #[test]
    fn test_purge_and_invalidate() {
        let store = FeatureStore::new();
        store.put(aged("a", 1.0, 300, 0));
        store.put(aged("b", 1.0, 5, 60));
        store.put(aged("c", 1.0, 5, 60));

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);

        assert!(store.invalidate("a"));
        assert!(!store.invalidate("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_ingest_rejects_bad_values() {
        let store = FeatureStore::new();
        assert!(matches!(
            store.ingest(Feature::new("cpu", f64::NAN, FeatureKind::RealTime, 60)),
            Err(FeatureError::NonFinite { .. })
        ));
        assert!(matches!(
            store.ingest(Feature::new(" ", 1.0, FeatureKind::RealTime, 60)),
            Err(FeatureError::EmptyName)
        ));
        assert!(store.ingest(Feature::new("cpu", 0.4, FeatureKind::RealTime, 60)).is_ok());
        assert_eq!(store.require("cpu").unwrap().value, 0.4);
        assert!(matches!(store.require("p99"), Err(FeatureError::NotFound(_))));
    }
}
