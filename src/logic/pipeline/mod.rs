//! Inference Pipeline
//!
//! ```text
//! request -> registry lookup -> resolve inputs (explicit > feature > default)
//!         -> clamp -> model.infer() -> safety.validate_model() -> InferenceResult
//! ```
//!
//! The pipeline holds no locks of its own across a run; concurrent runs only
//! share the registry, the feature store and the safety controller.

pub mod types;
pub mod resolve;
#[cfg(test)]
mod tests;

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::logic::features::FeatureStore;
use crate::logic::model::{
    InferenceError, ModelInputs, ModelOutput, ModelRegistry, RegisteredModel, RegistryError,
};
use crate::logic::safety::SafetyController;

pub use resolve::{resolve_inputs, ResolvedInputs};
pub use types::{InferenceResult, InputSource, PipelinePolicy};

pub struct InferencePipeline {
    registry: Arc<ModelRegistry>,
    features: Arc<FeatureStore>,
    safety: Arc<SafetyController>,
    use_stale_features: AtomicBool,
}

impl InferencePipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        features: Arc<FeatureStore>,
        safety: Arc<SafetyController>,
    ) -> Self {
        Self {
            registry,
            features,
            safety,
            use_stale_features: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn features(&self) -> &Arc<FeatureStore> {
        &self.features
    }

    pub fn safety(&self) -> &Arc<SafetyController> {
        &self.safety
    }

    pub fn policy(&self) -> PipelinePolicy {
        PipelinePolicy {
            use_stale_features: self.use_stale_features.load(Ordering::Acquire),
        }
    }

    pub fn apply_policy(&self, policy: PipelinePolicy) {
        tracing::info!("Pipeline policy updated: use_stale_features={}", policy.use_stale_features);
        self.use_stale_features
            .store(policy.use_stale_features, Ordering::Release);
    }

    /// Run one inference. Only an unknown model id is an error; model
    /// failures come back as a CRITICAL result carrying the fallback.
    pub fn run(
        &self,
        model_id: &str,
        explicit: &BTreeMap<String, f64>,
    ) -> Result<InferenceResult, RegistryError> {
        let registered = self.registry.get(model_id)?;
        let descriptor = &registered.descriptor;

        let keys: Vec<&str> = descriptor.inputs.iter().map(|p| p.key.as_str()).collect();
        let batch = self.features.get_many(&keys);
        let resolved = resolve_inputs(
            descriptor,
            explicit,
            &batch,
            self.use_stale_features.load(Ordering::Acquire),
        );

        let (data, safety, error) = match invoke(&registered, &resolved.values) {
            Ok(raw) => {
                let verdict = self
                    .safety
                    .validate_model(model_id, descriptor.category, &raw);
                (verdict.resolve(raw), verdict, None)
            }
            Err(e) => {
                let verdict = self
                    .safety
                    .record_failure(model_id, descriptor.category, &e.0);
                let fallback = verdict
                    .fallback
                    .clone()
                    .unwrap_or_else(|| self.safety.fallback(descriptor.category));
                (fallback, verdict, Some(e.to_string()))
            }
        };

        tracing::debug!(
            "Inference {} -> {} (fallback: {})",
            model_id,
            safety.level,
            safety.fallback_applied()
        );

        Ok(InferenceResult {
            id: Uuid::new_v4(),
            model_id: model_id.to_string(),
            category: descriptor.category,
            data,
            safety,
            inputs: resolved.values,
            input_sources: resolved.sources,
            error,
            timestamp: Utc::now(),
        })
    }
}

/// Call the model, converting panics and schema drift into `InferenceError`
fn invoke(
    registered: &RegisteredModel,
    inputs: &ModelInputs,
) -> Result<ModelOutput, InferenceError> {
    let output = panic::catch_unwind(AssertUnwindSafe(|| registered.model.infer(inputs)))
        .map_err(|payload| InferenceError(format!("model panicked: {}", panic_message(&*payload))))??;

    let produced: BTreeSet<&String> = output.keys().collect();
    let declared: BTreeSet<&String> = registered.descriptor.output_labels.keys().collect();
    if produced != declared {
        return Err(InferenceError(format!(
            "output fields {:?} do not match declared {:?}",
            produced, declared
        )));
    }

    Ok(output)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
