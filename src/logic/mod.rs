//! Logic Module - Control Plane Core
//!
//! Chứa các component: Feature Store, Model Registry, Inference Pipeline,
//! Safety Controller, Configuration Manager.
//!
//! ## Structure
//! - `features/` - Feature cache, telemetry sources, derived features
//! - `model/` - Descriptors, inference trait, registry, built-in models
//! - `pipeline/` - Input resolution + safety-gated inference
//! - `safety/` - Constraints, verdicts, fallbacks, emergency mode
//! - `config/` - Versioned parameter sets with a DRAFT..ACTIVE lifecycle
//! - `defaults` - Built-in wiring used at bootstrap
//! - `control` - Owns every component instance

pub mod features;
pub mod model;
pub mod pipeline;
pub mod safety;
pub mod config;
pub mod defaults;
pub mod control;
