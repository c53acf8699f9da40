//! Model Descriptors
//!
//! Immutable description of a registered model: category, input parameter
//! specs (bounds + default) and the output fields it promises to produce.
//! KHÔNG chứa inference logic - chỉ data structures.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// VALUE TYPES
// ============================================================================

/// Resolved numeric inputs handed to a model (name -> value)
pub type ModelInputs = BTreeMap<String, f64>;

/// Model output mapping (name -> number | string)
pub type ModelOutput = BTreeMap<String, OutputValue>;

/// A single output field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl OutputValue {
    /// Numeric view of the value, None for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OutputValue::Integer(v) => Some(*v as f64),
            OutputValue::Number(v) => Some(*v),
            OutputValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OutputValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for OutputValue {
    fn from(v: i64) -> Self {
        OutputValue::Integer(v)
    }
}

impl From<f64> for OutputValue {
    fn from(v: f64) -> Self {
        OutputValue::Number(v)
    }
}

impl From<&str> for OutputValue {
    fn from(v: &str) -> Self {
        OutputValue::Text(v.to_string())
    }
}

impl From<String> for OutputValue {
    fn from(v: String) -> Self {
        OutputValue::Text(v)
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputValue::Integer(v) => write!(f, "{}", v),
            OutputValue::Number(v) => write!(f, "{}", v),
            OutputValue::Text(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// CATEGORY
// ============================================================================

/// Model category - constraints and fallbacks are declared per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCategory {
    Capacity,
    Performance,
    Risk,
    Detection,
    Tuning,
    Optimization,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 6] = [
        ModelCategory::Capacity,
        ModelCategory::Performance,
        ModelCategory::Risk,
        ModelCategory::Detection,
        ModelCategory::Tuning,
        ModelCategory::Optimization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCategory::Capacity => "capacity",
            ModelCategory::Performance => "performance",
            ModelCategory::Risk => "risk",
            ModelCategory::Detection => "detection",
            ModelCategory::Tuning => "tuning",
            ModelCategory::Optimization => "optimization",
        }
    }
}

impl fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// INPUT PARAMETER SPEC
// ============================================================================

/// Declared input parameter: key, inclusive bounds and default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub key: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParamSpec {
    pub fn new(key: &str, min: f64, max: f64, default: f64) -> Self {
        Self {
            key: key.to_string(),
            min,
            max,
            default,
        }
    }

    /// Clamp a value into [min, max]. Non-finite values resolve to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    /// Reason the spec itself is unusable, if any
    pub(crate) fn defect(&self) -> Option<String> {
        if !self.min.is_finite() || !self.max.is_finite() || !self.default.is_finite() {
            return Some("bounds and default must be finite".to_string());
        }
        if self.min > self.max {
            return Some(format!("min {} > max {}", self.min, self.max));
        }
        if self.default < self.min || self.default > self.max {
            return Some(format!(
                "default {} outside [{}, {}]",
                self.default, self.min, self.max
            ));
        }
        None
    }
}

// ============================================================================
// DESCRIPTOR
// ============================================================================

/// Immutable model descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub category: ModelCategory,
    /// Ordered input parameter specs
    pub inputs: Vec<ParamSpec>,
    /// Output field -> display label
    pub output_labels: BTreeMap<String, String>,
    /// Guardrail names (enforced by the safety controller)
    pub guardrails: Vec<String>,
}

impl ModelDescriptor {
    pub fn new(id: &str, name: &str, category: ModelCategory) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            inputs: Vec::new(),
            output_labels: BTreeMap::new(),
            guardrails: Vec::new(),
        }
    }

    pub fn input(mut self, key: &str, min: f64, max: f64, default: f64) -> Self {
        self.inputs.push(ParamSpec::new(key, min, max, default));
        self
    }

    pub fn output(mut self, field: &str, label: &str) -> Self {
        self.output_labels.insert(field.to_string(), label.to_string());
        self
    }

    pub fn guardrail(mut self, name: &str) -> Self {
        self.guardrails.push(name.to_string());
        self
    }

    pub fn input_spec(&self, key: &str) -> Option<&ParamSpec> {
        self.inputs.iter().find(|p| p.key == key)
    }
}
