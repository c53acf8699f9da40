//! Config Module - Versioned Runtime Configuration
//!
//! - `types`: ConfigVersion snapshot, lifecycle states, deploy strategies
//! - `schema`: per-namespace schema check + impact diff
//! - `manager`: lifecycle state machine, active-pointer swap, drift checks

pub mod types;
pub mod schema;
pub mod manager;

pub use types::{
    compute_hash, ConfigVersion, DeployStrategy, DeploymentRecord, ParamMap, ParamValue, VersionState,
};
pub use schema::{
    assess_impact, FieldSpec, ImpactLevel, ImpactReport, NamespaceSchema, ParamChange, ParamType,
};
pub use manager::{
    ConfigError, ConfigManager, DriftReport, FieldDrift, ValidationOutcome, VersionInfo,
};
