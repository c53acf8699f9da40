//! Control Plane
//!
//! Owns every component instance and wires them together at bootstrap.
//! Deploys and rollbacks of the `safety` / `pipeline` namespaces are applied
//! to the live controller / pipeline under the same lock as the pointer swap,
//! so the running policy always matches the ACTIVE version.

use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::Mutex;

use crate::logic::config::{ConfigError, ConfigManager, ConfigVersion, DeployStrategy, ParamMap};
use crate::logic::defaults::{self, PIPELINE_NAMESPACE, SAFETY_NAMESPACE};
use crate::logic::features::{FeatureRefresher, FeatureStore, RefreshReport, TelemetrySource};
use crate::logic::model::{ModelRegistry, RegistryError};
use crate::logic::pipeline::{InferencePipeline, PipelinePolicy};
use crate::logic::safety::{SafetyController, SafetyPolicy, DEFAULT_LOG_CAPACITY};

// ============================================================================
// SETTINGS
// ============================================================================

/// Startup parameters for the core components
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub safety: SafetyPolicy,
    pub pipeline: PipelinePolicy,
    pub violation_log_capacity: usize,
    pub feature_ttl_secs: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            safety: SafetyPolicy::default(),
            pipeline: PipelinePolicy::default(),
            violation_log_capacity: DEFAULT_LOG_CAPACITY,
            feature_ttl_secs: 300,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("model registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("config bootstrap failed: {0}")]
    Config(#[from] ConfigError),
}

// ============================================================================
// CONTROL PLANE
// ============================================================================

pub struct ControlPlane {
    pub registry: Arc<ModelRegistry>,
    pub features: Arc<FeatureStore>,
    pub safety: Arc<SafetyController>,
    pub pipeline: Arc<InferencePipeline>,
    pub config: Arc<ConfigManager>,
    refresher: Mutex<FeatureRefresher>,
    /// Serializes pointer swap + apply
    apply_lock: Mutex<()>,
    /// Expired features stay readable (as stale) this long before purge
    stale_grace_secs: u64,
}

impl ControlPlane {
    /// Build all components, register built-ins and deploy the initial
    /// version of every namespace.
    pub fn bootstrap(settings: &ControlSettings) -> Result<Self, BootstrapError> {
        let registry = Arc::new(ModelRegistry::new());
        defaults::register_models(&registry)?;

        let safety = Arc::new(SafetyController::new(
            settings.safety,
            settings.violation_log_capacity,
        ));
        defaults::register_safety(&safety);

        let features = Arc::new(FeatureStore::new());
        let pipeline = Arc::new(InferencePipeline::new(
            Arc::clone(&registry),
            Arc::clone(&features),
            Arc::clone(&safety),
        ));

        let config = Arc::new(ConfigManager::new());
        defaults::register_namespaces(&config)?;

        let mut refresher = FeatureRefresher::new(settings.feature_ttl_secs);
        defaults::register_derived(&mut refresher, settings.feature_ttl_secs);

        let plane = Self {
            registry,
            features,
            safety,
            pipeline,
            config,
            refresher: Mutex::new(refresher),
            apply_lock: Mutex::new(()),
            stale_grace_secs: settings.feature_ttl_secs,
        };

        plane.ship_initial(SAFETY_NAMESPACE, defaults::safety_params(&settings.safety))?;
        plane.ship_initial(PIPELINE_NAMESPACE, defaults::pipeline_params(&settings.pipeline))?;
        plane.ship_initial(defaults::AUTOSCALER_NAMESPACE, defaults::autoscaler_params())?;

        tracing::info!(
            "Control plane ready: {} models, namespaces {:?}",
            plane.registry.len(),
            plane.config.namespaces()
        );
        Ok(plane)
    }

    fn ship_initial(&self, namespace: &str, params: ParamMap) -> Result<(), ConfigError> {
        let version = self.config.propose(namespace, params, defaults::BOOTSTRAP_AUTHOR)?;
        self.config.validate(namespace, version.version)?;
        self.deploy(namespace, version.version, DeployStrategy::Immediate)?;
        Ok(())
    }

    pub fn add_source(&self, source: Arc<dyn TelemetrySource>) {
        self.refresher.lock().add_source(source);
    }

    /// One refresh cycle followed by TTL garbage collection
    pub fn refresh_features(&self) -> RefreshReport {
        let report = self.refresher.lock().refresh(&self.features);
        let cutoff = Utc::now() - Duration::seconds(self.stale_grace_secs.min(i32::MAX as u64) as i64);
        let purged = self.features.purge_expired_at(cutoff);
        tracing::debug!(
            "Feature refresh: {} updated, {} derived, {} purged",
            report.updated.len(),
            report.derived.len(),
            purged
        );
        report
    }

    pub fn deploy(
        &self,
        namespace: &str,
        version: u64,
        strategy: DeployStrategy,
    ) -> Result<Arc<ConfigVersion>, ConfigError> {
        let _guard = self.apply_lock.lock();
        let active = self.config.deploy(namespace, version, strategy)?;
        self.apply(&active);
        Ok(active)
    }

    /// Explicit target, or the most recently deprecated version
    pub fn rollback(&self, namespace: &str, to_version: Option<u64>) -> Result<Arc<ConfigVersion>, ConfigError> {
        let _guard = self.apply_lock.lock();
        let active = match to_version {
            Some(version) => self.config.rollback(namespace, version)?,
            None => self.config.rollback_previous(namespace)?,
        };
        self.apply(&active);
        Ok(active)
    }

    /// Push runtime-tunable namespaces into the live components
    fn apply(&self, active: &ConfigVersion) {
        match active.namespace.as_str() {
            SAFETY_NAMESPACE => {
                let policy = defaults::safety_policy_from(&active.params, self.safety.policy());
                self.safety.apply_policy(policy);
            }
            PIPELINE_NAMESPACE => {
                let policy = defaults::pipeline_policy_from(&active.params, self.pipeline.policy());
                self.pipeline.apply_policy(policy);
            }
            _ => {}
        }
    }
}
