//! Features Module - Feature Store & Producers
//!
//! - `store`: cached feature values + freshness index
//! - `telemetry`: source interface, refresher, derived features

pub mod store;
pub mod telemetry;


pub use store::{Feature, FeatureBatch, FeatureError, FeatureKind, FeatureStore, FeatureSummary, Freshness};
pub use telemetry::{DerivedFeature, FeatureRefresher, RefreshReport, StaticSource, TelemetrySource};
