//! Safety Module - Output Validation & Escalation
//!
//! Every model output passes through the controller before it reaches a caller.
//!
//! # Architecture
//! - `types.rs`: `SafetyLevel`, `SafetyVerdict`, log entry, status snapshot
//! - `constraint.rs`: declarative per-category rules
//! - `log.rs`: bounded violation ring buffer
//! - `controller.rs`: verdicts, fallback substitution, emergency mode, overrides
//!
//! # Failure Strategy
//! Unknown or unevaluable constraints are skipped, never fail the request.
//! Any CRITICAL verdict puts the controller into EMERGENCY mode.

pub mod types;
pub mod constraint;
pub mod log;
pub mod controller;

pub use types::{
    ControllerMode, SafetyLevel, SafetyStatus, SafetyVerdict, ViolationEntry,
    EMERGENCY_VIOLATION, INFERENCE_FAILURE_VIOLATION,
};
pub use constraint::{Breach, Constraint, ConstraintCheck, ConstraintLevel, Evaluation};
pub use log::{ViolationLog, DEFAULT_LOG_CAPACITY};
pub use controller::{default_fallback, SafetyController, SafetyPolicy};
