//! Pipeline Types
//!
//! KHÔNG chứa logic - chỉ data structures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::model::{ModelCategory, ModelInputs, ModelOutput};
use crate::logic::safety::SafetyVerdict;

/// Which tier supplied a resolved input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Explicit,
    FeatureStore,
    /// Feature past its TTL, used only when stale features are allowed
    StaleFeature,
    Default,
}

/// Runtime-tunable pipeline parameters (`pipeline` config namespace)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePolicy {
    pub use_stale_features: bool,
}

/// One inference outcome. Value object: built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub id: Uuid,
    pub model_id: String,
    pub category: ModelCategory,
    /// Validated output, or the fallback that replaced it
    pub data: ModelOutput,
    pub safety: SafetyVerdict,
    /// Clamped inputs the model actually saw
    pub inputs: ModelInputs,
    pub input_sources: BTreeMap<String, InputSource>,
    /// Set when the model itself failed
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl InferenceResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
