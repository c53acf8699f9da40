//! Namespace Schemas & Impact Assessment
//!
//! Schema check là pure function: trả về toàn bộ danh sách lỗi, không sửa
//! giá trị nào.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::{ParamMap, ParamValue};

/// Relative change of a high-risk numeric key that flags the change
const HIGH_RISK_CHANGE_RATIO: f64 = 0.5;

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Bool,
    Int,
    /// Accepts ints too
    Float,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub kind: ParamType,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub required: bool,
    /// Large changes are flagged in the impact report
    pub high_risk: bool,
    /// Allowed values for text fields (empty = any)
    pub allowed: Vec<String>,
}

impl FieldSpec {
    fn new(key: &str, kind: ParamType) -> Self {
        Self {
            key: key.to_string(),
            kind,
            min: None,
            max: None,
            required: true,
            high_risk: false,
            allowed: Vec::new(),
        }
    }

    pub fn int(key: &str, min: i64, max: i64) -> Self {
        let mut f = Self::new(key, ParamType::Int);
        f.min = Some(min as f64);
        f.max = Some(max as f64);
        f
    }

    pub fn float(key: &str, min: f64, max: f64) -> Self {
        let mut f = Self::new(key, ParamType::Float);
        f.min = Some(min);
        f.max = Some(max);
        f
    }

    pub fn boolean(key: &str) -> Self {
        Self::new(key, ParamType::Bool)
    }

    pub fn text(key: &str, allowed: &[&str]) -> Self {
        let mut f = Self::new(key, ParamType::Text);
        f.allowed = allowed.iter().map(|s| s.to_string()).collect();
        f
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn high_risk(mut self) -> Self {
        self.high_risk = true;
        self
    }

    fn check(&self, value: &ParamValue, errors: &mut Vec<String>) {
        let type_ok = match (self.kind, value) {
            (ParamType::Bool, ParamValue::Bool(_)) => true,
            (ParamType::Int, ParamValue::Int(_)) => true,
            (ParamType::Float, ParamValue::Int(_) | ParamValue::Float(_)) => true,
            (ParamType::Text, ParamValue::Text(_)) => true,
            _ => false,
        };
        if !type_ok {
            errors.push(format!(
                "Field '{}' must be {}, got {}",
                self.key,
                type_label(self.kind),
                value.type_name()
            ));
            return;
        }

        if let Some(v) = value.as_f64() {
            if !v.is_finite() {
                errors.push(format!("Field '{}' must be finite, got {}", self.key, v));
                return;
            }
            let below = self.min.map_or(false, |min| v < min);
            let above = self.max.map_or(false, |max| v > max);
            if below || above {
                errors.push(format!(
                    "Field '{}' must be in range [{}, {}], got {}",
                    self.key,
                    self.min.map_or("-inf".to_string(), |m| m.to_string()),
                    self.max.map_or("inf".to_string(), |m| m.to_string()),
                    value
                ));
            }
        }

        if let ParamValue::Text(s) = value {
            if !self.allowed.is_empty() && !self.allowed.iter().any(|a| a == s) {
                errors.push(format!(
                    "Field '{}' must be one of {:?}, got '{}'",
                    self.key, self.allowed, s
                ));
            }
        }
    }
}

fn type_label(kind: ParamType) -> &'static str {
    match kind {
        ParamType::Bool => "bool",
        ParamType::Int => "int",
        ParamType::Float => "float",
        ParamType::Text => "string",
    }
}

/// Declared parameter set for one namespace. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSchema {
    pub namespace: String,
    pub fields: Vec<FieldSpec>,
}

impl NamespaceSchema {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn spec(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// All schema errors (empty = valid)
    pub fn check(&self, params: &ParamMap) -> Vec<String> {
        let mut errors = Vec::new();

        for spec in &self.fields {
            match params.get(&spec.key) {
                Some(value) => spec.check(value, &mut errors),
                None if spec.required => errors.push(format!("Missing required field: {}", spec.key)),
                None => {}
            }
        }

        for key in params.keys() {
            if self.spec(key).is_none() {
                errors.push(format!("Unknown field: {}", key));
            }
        }

        errors
    }
}

// ============================================================================
// IMPACT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamChange {
    pub field: String,
    pub old_value: Option<ParamValue>,
    pub new_value: Option<ParamValue>,
    /// Set for flagged high-risk changes, e.g. "Large change (120.0%)"
    pub reason: Option<String>,
}

/// Diff of a proposed parameter set against the ACTIVE one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub total_changes: usize,
    pub changes: Vec<ParamChange>,
    pub high_risk_changes: Vec<ParamChange>,
    pub impact_level: ImpactLevel,
}

impl ImpactReport {
    /// Human-readable warnings for the high-risk changes
    pub fn warnings(&self) -> Vec<String> {
        self.high_risk_changes
            .iter()
            .map(|c| {
                format!(
                    "High-risk change to {}: {}",
                    c.field,
                    c.reason.as_deref().unwrap_or("changed")
                )
            })
            .collect()
    }
}

pub fn assess_impact(schema: &NamespaceSchema, current: &ParamMap, proposed: &ParamMap) -> ImpactReport {
    let keys: BTreeSet<&String> = current.keys().chain(proposed.keys()).collect();
    let mut changes = Vec::new();
    let mut high_risk_changes = Vec::new();

    for key in keys {
        let old_value = current.get(key);
        let new_value = proposed.get(key);
        if old_value == new_value {
            continue;
        }

        let mut change = ParamChange {
            field: key.clone(),
            old_value: old_value.cloned(),
            new_value: new_value.cloned(),
            reason: None,
        };

        let high_risk = schema.spec(key).map_or(false, |s| s.high_risk);
        if high_risk {
            let old = old_value.and_then(ParamValue::as_f64);
            let new = new_value.and_then(ParamValue::as_f64);
            if let (Some(old), Some(new)) = (old, new) {
                if old != 0.0 {
                    let ratio = ((new - old) / old).abs();
                    if ratio > HIGH_RISK_CHANGE_RATIO {
                        change.reason = Some(format!("Large change ({:.1}%)", ratio * 100.0));
                        high_risk_changes.push(change.clone());
                    }
                }
            }
        }

        changes.push(change);
    }

    let impact_level = if !high_risk_changes.is_empty() {
        ImpactLevel::High
    } else if !changes.is_empty() {
        ImpactLevel::Medium
    } else {
        ImpactLevel::Low
    };

    ImpactReport {
        total_changes: changes.len(),
        changes,
        high_risk_changes,
        impact_level,
    }
}
