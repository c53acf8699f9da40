//! Inference Function Interface
//!
//! Pipeline không quan tâm model là trained model hay closed-form formula.
//! Mọi model chỉ cần implement `InferenceModel`.

use super::descriptor::{ModelInputs, ModelOutput};

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Runtime failure raised by a model implementation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("InferenceError: {0}")]
pub struct InferenceError(pub String);

// ============================================================================
// INFERENCE MODEL TRAIT
// ============================================================================

/// Pluggable inference function with a fixed output schema
pub trait InferenceModel: Send + Sync {
    /// Output fields this model produces. Must match the descriptor's labels.
    fn output_fields(&self) -> Vec<String>;

    /// Run inference on already-clamped, complete inputs
    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError>;
}

/// Adapter turning a closure into an `InferenceModel`
pub struct FnModel<F> {
    fields: Vec<String>,
    f: F,
}

impl<F> FnModel<F>
where
    F: Fn(&ModelInputs) -> Result<ModelOutput, InferenceError> + Send + Sync,
{
    pub fn new(fields: &[&str], f: F) -> Self {
        Self {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            f,
        }
    }
}

impl<F> InferenceModel for FnModel<F>
where
    F: Fn(&ModelInputs) -> Result<ModelOutput, InferenceError> + Send + Sync,
{
    fn output_fields(&self) -> Vec<String> {
        self.fields.clone()
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError> {
        (self.f)(inputs)
    }
}

/// Read a resolved input, 0.0 when absent
pub(crate) fn input(inputs: &ModelInputs, key: &str) -> f64 {
    inputs.get(key).copied().unwrap_or(0.0)
}
