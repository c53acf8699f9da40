//! Config Types
//!
//! ConfigVersion là immutable snapshot. Lifecycle state nằm ngoài snapshot
//! (trong ledger của manager), nên snapshot có thể chia sẻ qua `Arc`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// PARAMETER VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "string",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Sorted key -> value mapping (sorted order makes the hash canonical)
pub type ParamMap = BTreeMap<String, ParamValue>;

// ============================================================================
// LIFECYCLE
// ============================================================================

/// DRAFT -> VALIDATING -> APPROVED -> DEPLOYING -> ACTIVE -> {DEPRECATED | ROLLED_BACK}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionState {
    Draft,
    Validating,
    Approved,
    Deploying,
    Active,
    Deprecated,
    RolledBack,
}

impl fmt::Display for VersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionState::Draft => "DRAFT",
            VersionState::Validating => "VALIDATING",
            VersionState::Approved => "APPROVED",
            VersionState::Deploying => "DEPLOYING",
            VersionState::Active => "ACTIVE",
            VersionState::Deprecated => "DEPRECATED",
            VersionState::RolledBack => "ROLLED_BACK",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeployStrategy {
    Immediate,
    /// Expose to `percentage` % of traffic first
    Canary { percentage: u8 },
    /// Roll out in `batches` steps
    Rolling { batches: u32 },
}

impl Default for DeployStrategy {
    fn default() -> Self {
        DeployStrategy::Immediate
    }
}

impl DeployStrategy {
    pub fn check(&self) -> Result<(), String> {
        match *self {
            DeployStrategy::Immediate => Ok(()),
            DeployStrategy::Canary { percentage } if (1..=100).contains(&percentage) => Ok(()),
            DeployStrategy::Canary { percentage } => {
                Err(format!("canary percentage must be in 1..=100, got {}", percentage))
            }
            DeployStrategy::Rolling { batches } if batches >= 1 => Ok(()),
            DeployStrategy::Rolling { .. } => Err("rolling deploy needs at least 1 batch".to_string()),
        }
    }
}

impl fmt::Display for DeployStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStrategy::Immediate => write!(f, "immediate"),
            DeployStrategy::Canary { percentage } => write!(f, "canary({}%)", percentage),
            DeployStrategy::Rolling { batches } => write!(f, "rolling({} batches)", batches),
        }
    }
}

/// How and when a version became ACTIVE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub strategy: DeployStrategy,
    pub activated_at: DateTime<Utc>,
    /// ACTIVE version this one replaced
    pub replaced: Option<u64>,
    pub rollback: bool,
}

// ============================================================================
// CONFIG VERSION
// ============================================================================

/// Immutable parameter snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub namespace: String,
    pub version: u64,
    pub content_hash: String,
    pub params: ParamMap,
    pub created_at: DateTime<Utc>,
    pub author: String,
}

impl ConfigVersion {
    pub fn new(namespace: &str, version: u64, params: ParamMap, author: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            version,
            content_hash: compute_hash(&params),
            params,
            created_at: Utc::now(),
            author: author.to_string(),
        }
    }

    /// Recompute the content hash and compare with the stored one
    pub fn verify(&self) -> Result<(), String> {
        let actual = compute_hash(&self.params);
        if actual == self.content_hash {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

/// First 16 hex chars of SHA-256 over the canonical (sorted-key) JSON
pub fn compute_hash(params: &ParamMap) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, ParamValue)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_hash_is_order_independent_and_short() {
        let a = params(&[("max_workers", ParamValue::Int(10)), ("timeout_ms", ParamValue::Int(500))]);
        let mut b = ParamMap::new();
        b.insert("timeout_ms".into(), ParamValue::Int(500));
        b.insert("max_workers".into(), ParamValue::Int(10));

        assert_eq!(compute_hash(&a), compute_hash(&b));
        assert_eq!(compute_hash(&a).len(), 16);
        assert_ne!(compute_hash(&a), compute_hash(&params(&[("max_workers", ParamValue::Int(11))])));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let mut v = ConfigVersion::new("autoscaler", 1, params(&[("max_workers", ParamValue::Int(10))]), "ops");
        assert!(v.verify().is_ok());

        v.params.insert("max_workers".into(), ParamValue::Int(99));
        assert!(v.verify().is_err());
    }

    #[test]
    fn test_param_value_untagged_serde() {
        let parsed: ParamMap =
            serde_json::from_str(r#"{"a": true, "b": 5, "c": 0.5, "d": "x"}"#).unwrap();
        assert_eq!(parsed["a"], ParamValue::Bool(true));
        assert_eq!(parsed["b"], ParamValue::Int(5));
        assert_eq!(parsed["c"], ParamValue::Float(0.5));
        assert_eq!(parsed["d"], ParamValue::Text("x".into()));
    }

    #[test]
    fn test_strategy_check() {
        assert!(DeployStrategy::Immediate.check().is_ok());
        assert!(DeployStrategy::Canary { percentage: 10 }.check().is_ok());
        assert!(DeployStrategy::Canary { percentage: 0 }.check().is_err());
        assert!(DeployStrategy::Canary { percentage: 101 }.check().is_err());
        assert!(DeployStrategy::Rolling { batches: 0 }.check().is_err());

        let parsed: DeployStrategy =
            serde_json::from_str(r#"{"type": "canary", "percentage": 5}"#).unwrap();
        assert_eq!(parsed, DeployStrategy::Canary { percentage: 5 });
    }
}
