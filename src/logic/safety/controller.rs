//! Safety Controller
//!
//! CHỈ chứa logic quyết định safety - types nằm trong `types.rs`.
//! Input: model category + raw output
//! Output: SafetyVerdict (+ fallback substitution)
//!
//! ## Escalation
//! ```text
//! SAFE / WARNING  -> pass through, streak reset
//! UNSAFE          -> fallback (unless human override), streak += 1
//! streak >= N in window, or invariant breach -> CRITICAL -> EMERGENCY mode
//! EMERGENCY       -> every call returns CRITICAL + fallback until cleared
//! ```
//!
//! Mode, overrides, streaks and the violation log sit behind one mutex so
//! that emergency transitions are linearizable.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::constraint::{Constraint, Evaluation};
use super::log::{ViolationLog, DEFAULT_LOG_CAPACITY};
use super::types::*;
use crate::logic::model::{ModelCategory, ModelOutput};

// ============================================================================
// POLICY
// ============================================================================

/// Escalation parameters (runtime-tunable via the `safety` config namespace)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// Consecutive UNSAFE verdicts for one model that escalate to CRITICAL
    pub escalation_threshold: usize,
    /// Trailing window for the streak
    pub escalation_window_secs: i64,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            escalation_threshold: 3,
            escalation_window_secs: 60,
        }
    }
}

impl SafetyPolicy {
    pub fn normalized(self) -> Self {
        Self {
            escalation_threshold: self.escalation_threshold.max(1),
            escalation_window_secs: self.escalation_window_secs.max(1),
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

struct ControllerState {
    mode: ControllerMode,
    emergency_reason: Option<String>,
    overrides: HashSet<ModelCategory>,
    log: ViolationLog,
    /// model id -> timestamps of the current UNSAFE streak
    streaks: HashMap<String, VecDeque<DateTime<Utc>>>,
    policy: SafetyPolicy,
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ControllerState {
    /// Strictly increasing timestamp for the log
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    /// Push an UNSAFE timestamp; true when the streak reaches the threshold
    fn extend_streak(&mut self, model_id: &str, now: DateTime<Utc>) -> bool {
        let window = Duration::seconds(self.policy.escalation_window_secs);
        let streak = self.streaks.entry(model_id.to_string()).or_default();
        streak.push_back(now);
        while let Some(first) = streak.front() {
            if now - *first > window {
                streak.pop_front();
            } else {
                break;
            }
        }
        streak.len() >= self.policy.escalation_threshold
    }

    fn clear_streak(&mut self, model_id: &str) {
        self.streaks.remove(model_id);
    }

    /// First trigger wins; later triggers while already in EMERGENCY are no-ops
    fn enter_emergency(&mut self, reason: String) -> bool {
        if self.mode == ControllerMode::Emergency {
            return false;
        }
        tracing::error!("🚨 Emergency mode activated: {}", reason);
        self.mode = ControllerMode::Emergency;
        self.emergency_reason = Some(reason);
        true
    }

    fn record(
        &mut self,
        model_id: &str,
        category: ModelCategory,
        verdict: &SafetyVerdict,
        output: Option<&ModelOutput>,
        timestamp: DateTime<Utc>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.log.push(ViolationEntry {
            id: Uuid::new_v4(),
            seq,
            timestamp,
            model_id: model_id.to_string(),
            category,
            level: verdict.level,
            violations: verdict.violations.clone(),
            warnings: verdict.warnings.clone(),
            fallback_applied: verdict.fallback_applied(),
            rejected_output: if verdict.fallback_applied() { output.cloned() } else { None },
        });
    }
}

/// Constraint evaluation result before any stateful decision
struct Assessment {
    level: SafetyLevel,
    violations: Vec<String>,
    warnings: Vec<String>,
    skipped: Vec<String>,
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct SafetyController {
    constraints: RwLock<HashMap<ModelCategory, Vec<Constraint>>>,
    fallbacks: RwLock<HashMap<ModelCategory, ModelOutput>>,
    state: Mutex<ControllerState>,
}

impl Default for SafetyController {
    fn default() -> Self {
        Self::new(SafetyPolicy::default(), DEFAULT_LOG_CAPACITY)
    }
}

impl SafetyController {
    pub fn new(policy: SafetyPolicy, log_capacity: usize) -> Self {
        Self {
            constraints: RwLock::new(HashMap::new()),
            fallbacks: RwLock::new(HashMap::new()),
            state: Mutex::new(ControllerState {
                mode: ControllerMode::Normal,
                emergency_reason: None,
                overrides: HashSet::new(),
                log: ViolationLog::new(log_capacity),
                streaks: HashMap::new(),
                policy: policy.normalized(),
                next_seq: 0,
                last_timestamp: None,
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    /// Append a constraint to its category (evaluation order = registration order)
    pub fn register_constraint(&self, constraint: Constraint) {
        tracing::info!(
            "Registered safety constraint '{}' for {} ({:?})",
            constraint.name,
            constraint.category,
            constraint.level
        );
        self.constraints
            .write()
            .entry(constraint.category)
            .or_default()
            .push(constraint);
    }

    pub fn constraints(&self, category: ModelCategory) -> Vec<Constraint> {
        self.constraints
            .read()
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_fallback(&self, category: ModelCategory, output: ModelOutput) {
        self.fallbacks.write().insert(category, output);
    }

    /// Declared fallback, or the generic no-action fallback
    pub fn fallback(&self, category: ModelCategory) -> ModelOutput {
        self.fallbacks
            .read()
            .get(&category)
            .cloned()
            .unwrap_or_else(default_fallback)
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    /// Validate keyed by category (escalation streak shared by the category)
    pub fn validate(&self, category: ModelCategory, output: &ModelOutput) -> SafetyVerdict {
        self.validate_model(category.as_str(), category, output)
    }

    /// Validate one model's output; the escalation streak is tracked per model id
    pub fn validate_model(
        &self,
        model_id: &str,
        category: ModelCategory,
        output: &ModelOutput,
    ) -> SafetyVerdict {
        let assessment = self.assess(category, output);
        let fallback = self.fallback(category);

        let mut state = self.state.lock();
        let now = state.next_timestamp();

        let mut verdict = SafetyVerdict {
            level: assessment.level,
            violations: assessment.violations,
            warnings: assessment.warnings,
            skipped: assessment.skipped,
            fallback: None,
            override_applied: false,
            escalated: false,
        };

        if state.mode == ControllerMode::Emergency {
            verdict.level = SafetyLevel::Critical;
            verdict.violations.push(EMERGENCY_VIOLATION.to_string());
            verdict.fallback = Some(fallback);
            tracing::warn!("Emergency mode active - rejecting output of '{}'", model_id);
            state.record(model_id, category, &verdict, Some(output), now);
            return verdict;
        }

        match verdict.level {
            SafetyLevel::Unsafe => {
                if state.extend_streak(model_id, now) {
                    verdict.level = SafetyLevel::Critical;
                    verdict.escalated = true;
                }
            }
            _ => state.clear_streak(model_id),
        }

        match verdict.level {
            SafetyLevel::Critical => {
                state.clear_streak(model_id);
                let reason = if verdict.escalated {
                    format!(
                        "{} consecutive UNSAFE verdicts for '{}' within {}s",
                        state.policy.escalation_threshold, model_id, state.policy.escalation_window_secs
                    )
                } else {
                    format!(
                        "invariant breach by '{}': {}",
                        model_id,
                        verdict.violations.join(", ")
                    )
                };
                state.enter_emergency(reason);
                verdict.fallback = Some(fallback);
            }
            SafetyLevel::Unsafe => {
                if state.overrides.contains(&category) {
                    verdict.override_applied = true;
                    tracing::warn!(
                        "Human override active for {} - keeping UNSAFE output of '{}': {:?}",
                        category,
                        model_id,
                        verdict.violations
                    );
                } else {
                    tracing::warn!(
                        "Output of '{}' failed safety checks, using fallback: {:?}",
                        model_id,
                        verdict.violations
                    );
                    verdict.fallback = Some(fallback);
                }
            }
            SafetyLevel::Warning => {
                tracing::warn!("Safety warning for '{}': {:?}", model_id, verdict.warnings);
            }
            SafetyLevel::Safe => {}
        }

        state.record(model_id, category, &verdict, Some(output), now);
        verdict
    }

    /// Model raised instead of producing output: CRITICAL-equivalent handling.
    /// Counts toward the model's escalation streak.
    pub fn record_failure(&self, model_id: &str, category: ModelCategory, error: &str) -> SafetyVerdict {
        tracing::error!("Model '{}' inference failed: {}", model_id, error);
        let fallback = self.fallback(category);

        let mut state = self.state.lock();
        let now = state.next_timestamp();

        let mut violations = vec![INFERENCE_FAILURE_VIOLATION.to_string()];
        let mut escalated = false;

        if state.mode == ControllerMode::Emergency {
            violations.push(EMERGENCY_VIOLATION.to_string());
        } else if state.extend_streak(model_id, now) {
            escalated = true;
            state.clear_streak(model_id);
            let reason = format!("repeated inference failures for '{}'", model_id);
            state.enter_emergency(reason);
        }

        let verdict = SafetyVerdict {
            level: SafetyLevel::Critical,
            violations,
            warnings: Vec::new(),
            skipped: Vec::new(),
            fallback: Some(fallback),
            override_applied: false,
            escalated,
        };
        state.record(model_id, category, &verdict, None, now);
        verdict
    }

    fn assess(&self, category: ModelCategory, output: &ModelOutput) -> Assessment {
        let constraints = self.constraints.read();
        let mut assessment = Assessment {
            level: SafetyLevel::Safe,
            violations: Vec::new(),
            warnings: Vec::new(),
            skipped: Vec::new(),
        };

        for constraint in constraints.get(&category).into_iter().flatten() {
            match constraint.evaluate(output) {
                Evaluation::Pass => {}
                Evaluation::Violated(breach) => {
                    let severity = constraint.severity(breach);
                    assessment.level = assessment.level.max(severity);
                    if severity == SafetyLevel::Warning {
                        assessment.warnings.push(constraint.name.clone());
                    } else {
                        assessment.violations.push(constraint.name.clone());
                    }
                }
                Evaluation::Skipped(reason) => {
                    tracing::debug!(
                        "Constraint '{}' cannot be evaluated, skipping: {}",
                        constraint.name,
                        reason
                    );
                    assessment.skipped.push(constraint.name.clone());
                }
            }
        }

        assessment
    }

    // ------------------------------------------------------------------------
    // Operator controls
    // ------------------------------------------------------------------------

    /// Explicit operator control. Idempotent; returns the previous mode.
    pub fn set_emergency_mode(&self, enabled: bool, reason: &str) -> ControllerMode {
        let mut state = self.state.lock();
        let previous = state.mode;

        if enabled {
            if previous == ControllerMode::Normal {
                state.mode = ControllerMode::Emergency;
                state.emergency_reason = Some(reason.to_string());
            }
            tracing::error!("Emergency mode enabled by operator (was {}): {}", previous, reason);
        } else {
            state.mode = ControllerMode::Normal;
            state.emergency_reason = None;
            state.streaks.clear();
            tracing::warn!("Emergency mode cleared by operator (was {}): {}", previous, reason);
        }

        previous
    }

    /// Human override for one category. Returns the previous flag.
    pub fn set_override(&self, category: ModelCategory, enabled: bool) -> bool {
        let mut state = self.state.lock();
        let previous = if enabled {
            !state.overrides.insert(category)
        } else {
            state.overrides.remove(&category)
        };
        tracing::warn!(
            "Human override for {} {} (was {})",
            category,
            if enabled { "enabled" } else { "disabled" },
            previous
        );
        previous
    }

    pub fn mode(&self) -> ControllerMode {
        self.state.lock().mode
    }

    pub fn policy(&self) -> SafetyPolicy {
        self.state.lock().policy
    }

    pub fn apply_policy(&self, policy: SafetyPolicy) {
        let policy = policy.normalized();
        let mut state = self.state.lock();
        tracing::info!(
            "Safety policy updated: threshold {} -> {}, window {}s -> {}s",
            state.policy.escalation_threshold,
            policy.escalation_threshold,
            state.policy.escalation_window_secs,
            policy.escalation_window_secs
        );
        state.policy = policy;
    }

    /// Last `limit` log entries, oldest first
    pub fn recent(&self, limit: usize) -> Vec<ViolationEntry> {
        self.state.lock().log.recent(limit)
    }

    pub fn status(&self) -> SafetyStatus {
        let state = self.state.lock();
        let mut overrides: Vec<ModelCategory> = state.overrides.iter().copied().collect();
        overrides.sort();

        SafetyStatus {
            mode: state.mode,
            emergency_reason: state.emergency_reason.clone(),
            overrides,
            violation_count: state.log.total(),
            recent_violations: state.log.recent(10),
            escalation_threshold: state.policy.escalation_threshold,
            escalation_window_secs: state.policy.escalation_window_secs,
        }
    }
}

/// Generic fallback for categories without a declared one
pub fn default_fallback() -> ModelOutput {
    let mut out = ModelOutput::new();
    out.insert("action".into(), "no_action".into());
    out.insert("reason".into(), "safety_fallback".into());
    out
}
