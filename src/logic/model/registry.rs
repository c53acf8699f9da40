//! Model Registry
//!
//! Maps a model id to its descriptor and inference function.
//! Registration order is preserved for `list()`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use super::descriptor::ModelDescriptor;
use super::inference::InferenceModel;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("model '{0}' is already registered")]
    DuplicateModel(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("model '{id}' output fields {produced:?} do not match declared outputs {declared:?}")]
    OutputMismatch {
        id: String,
        produced: Vec<String>,
        declared: Vec<String>,
    },

    #[error("model '{id}' input '{key}' is invalid: {reason}")]
    InvalidInput {
        id: String,
        key: String,
        reason: String,
    },
}

// ============================================================================
// REGISTRY
// ============================================================================

/// A registered model: immutable descriptor + inference function
pub struct RegisteredModel {
    pub descriptor: ModelDescriptor,
    pub model: Arc<dyn InferenceModel>,
}

#[derive(Default)]
struct RegistryInner {
    ordered: Vec<Arc<RegisteredModel>>,
    index: HashMap<String, usize>,
}

#[derive(Default)]
pub struct ModelRegistry {
    inner: RwLock<RegistryInner>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. Fails fast on duplicate id, bad input specs or an
    /// output field set that differs from the descriptor's labels.
    pub fn register(
        &self,
        descriptor: ModelDescriptor,
        model: Arc<dyn InferenceModel>,
    ) -> Result<(), RegistryError> {
        for spec in &descriptor.inputs {
            if let Some(reason) = spec.defect() {
                return Err(RegistryError::InvalidInput {
                    id: descriptor.id.clone(),
                    key: spec.key.clone(),
                    reason,
                });
            }
        }

        let produced: BTreeSet<String> = model.output_fields().into_iter().collect();
        let declared: BTreeSet<String> = descriptor.output_labels.keys().cloned().collect();
        if produced != declared {
            return Err(RegistryError::OutputMismatch {
                id: descriptor.id.clone(),
                produced: produced.into_iter().collect(),
                declared: declared.into_iter().collect(),
            });
        }

        let mut inner = self.inner.write();
        if inner.index.contains_key(&descriptor.id) {
            return Err(RegistryError::DuplicateModel(descriptor.id));
        }

        tracing::info!(
            "Registered model '{}' ({}, {} inputs, {} outputs)",
            descriptor.id,
            descriptor.category,
            descriptor.inputs.len(),
            declared.len()
        );

        let position = inner.ordered.len();
        inner.index.insert(descriptor.id.clone(), position);
        inner.ordered.push(Arc::new(RegisteredModel { descriptor, model }));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<RegisteredModel>, RegistryError> {
        let inner = self.inner.read();
        inner
            .index
            .get(id)
            .map(|&i| Arc::clone(&inner.ordered[i]))
            .ok_or_else(|| RegistryError::UnknownModel(id.to_string()))
    }

    /// Registered id for `id`, accepting the hyphenated spelling
    /// (`tail-slo` for `tail_slo`) when the literal id is unknown.
    pub fn resolve_id(&self, id: &str) -> String {
        let inner = self.inner.read();
        if inner.index.contains_key(id) {
            return id.to_string();
        }
        let underscored = id.replace('-', "_");
        if inner.index.contains_key(&underscored) {
            underscored
        } else {
            id.to_string()
        }
    }

    /// Descriptors in registration order
    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.inner
            .read()
            .ordered
            .iter()
            .map(|m| m.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
