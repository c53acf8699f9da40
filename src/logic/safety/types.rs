//! Safety Types
//!
//! Core types cho safety decisions.
//! KHÔNG chứa logic - chỉ data structures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::model::{ModelCategory, ModelOutput};

// ============================================================================
// SAFETY LEVEL
// ============================================================================

/// Verdict severity, ordered SAFE < WARNING < UNSAFE < CRITICAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyLevel {
    Safe,
    Warning,
    Unsafe,
    Critical,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "SAFE",
            SafetyLevel::Warning => "WARNING",
            SafetyLevel::Unsafe => "UNSAFE",
            SafetyLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONTROLLER MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerMode {
    Normal,
    Emergency,
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerMode::Normal => write!(f, "NORMAL"),
            ControllerMode::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

// ============================================================================
// VERDICT
// ============================================================================

/// Violation name used while emergency mode blocks every output
pub const EMERGENCY_VIOLATION: &str = "emergency_mode_active";

/// Violation name attached when the model itself failed
pub const INFERENCE_FAILURE_VIOLATION: &str = "model_inference_error";

/// Outcome of validating one model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub level: SafetyLevel,
    /// Constraints breached at UNSAFE / CRITICAL severity
    pub violations: Vec<String>,
    /// Constraints breached at WARNING severity (soft or advisory)
    pub warnings: Vec<String>,
    /// Constraints that could not be evaluated (fields absent / non-numeric)
    pub skipped: Vec<String>,
    /// Substituted output, when the original must not reach the caller
    pub fallback: Option<ModelOutput>,
    /// Human override kept the original output despite an UNSAFE verdict
    pub override_applied: bool,
    /// UNSAFE streak promoted this verdict to CRITICAL
    pub escalated: bool,
}

impl SafetyVerdict {
    pub fn fallback_applied(&self) -> bool {
        self.fallback.is_some()
    }

    /// The output the caller is allowed to see
    pub fn resolve(&self, raw: ModelOutput) -> ModelOutput {
        match &self.fallback {
            Some(fallback) => fallback.clone(),
            None => raw,
        }
    }
}

// ============================================================================
// VIOLATION LOG ENTRY
// ============================================================================

/// One entry in the bounded violation log (every verdict is recorded)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEntry {
    pub id: Uuid,
    /// Monotonic per-controller sequence number
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
    pub category: ModelCategory,
    pub level: SafetyLevel,
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
    pub fallback_applied: bool,
    /// Output that was rejected (only kept when a fallback replaced it)
    pub rejected_output: Option<ModelOutput>,
}

/// Snapshot for `GET /safety/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyStatus {
    pub mode: ControllerMode,
    pub emergency_reason: Option<String>,
    pub overrides: Vec<ModelCategory>,
    /// Total verdicts recorded since start (including evicted ones)
    pub violation_count: u64,
    pub recent_violations: Vec<ViolationEntry>,
    pub escalation_threshold: usize,
    pub escalation_window_secs: i64,
}
