//! Model Module - Registry & Inference Interface
//!
//! ## Structure
//! - `descriptor`: ModelDescriptor, ParamSpec, output value types
//! - `inference`: `InferenceModel` trait (pluggable inference function)
//! - `registry`: id -> (descriptor, model), registration-order listing
//! - `builtin`: closed-form models shipped with the service

pub mod descriptor;
pub mod inference;
pub mod registry;
pub mod builtin;

// Re-export common types
pub use descriptor::{ModelCategory, ModelDescriptor, ModelInputs, ModelOutput, OutputValue, ParamSpec};
pub use inference::{FnModel, InferenceError, InferenceModel};
pub use registry::{ModelRegistry, RegisteredModel, RegistryError};
pub use builtin::builtin_models;
