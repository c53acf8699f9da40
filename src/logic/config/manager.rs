//! Configuration Manager
//!
//! Versioned, schema-checked parameter snapshots per namespace.
//!
//! ## Lifecycle
//! ```text
//! propose   -> DRAFT
//! validate  -> VALIDATING -> APPROVED        (schema error: back to DRAFT)
//! deploy    -> DEPLOYING  -> ACTIVE          (old ACTIVE -> DEPRECATED)
//! rollback  -> ACTIVE -> ROLLED_BACK, DEPRECATED target -> ACTIVE
//! ```
//!
//! Mutations of one namespace are serialized by its ledger mutex. Readers
//! only touch the active pointer (`RwLock<Option<Arc<ConfigVersion>>>`), which
//! is swapped in one write, so they see the fully-old or fully-new version.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::schema::{assess_impact, ImpactReport, NamespaceSchema};
use super::types::*;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown config namespace '{0}'")]
    UnknownNamespace(String),

    #[error("config namespace '{0}' is already registered")]
    DuplicateNamespace(String),

    #[error("version {version} not found in namespace '{namespace}'")]
    UnknownVersion { namespace: String, version: u64 },

    #[error("config validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("version {version} cannot move from {from} to {to}")]
    InvalidTransition {
        version: u64,
        from: VersionState,
        to: VersionState,
    },

    #[error("invalid deploy strategy: {0}")]
    InvalidStrategy(String),

    #[error("no active version in namespace '{0}'")]
    NoActiveVersion(String),

    #[error("no deprecated version to roll back to in namespace '{0}'")]
    NothingToRollBack(String),

    #[error("content hash mismatch for {namespace} v{version}: stored {stored}, computed {computed}")]
    Drift {
        namespace: String,
        version: u64,
        stored: String,
        computed: String,
    },
}

// ============================================================================
// VIEWS
// ============================================================================

/// Snapshot + lifecycle metadata, for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(flatten)]
    pub config: ConfigVersion,
    pub state: VersionState,
    pub state_changed_at: DateTime<Utc>,
    pub impact: Option<ImpactReport>,
    pub deployment: Option<DeploymentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub version: u64,
    pub state: VersionState,
    pub content_hash: String,
    /// None when there is no ACTIVE version to compare with
    pub impact: Option<ImpactReport>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDrift {
    pub field: String,
    pub expected: Option<ParamValue>,
    pub observed: Option<ParamValue>,
}

/// Observed parameters vs the ACTIVE version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_detected: bool,
    pub drifts: Vec<FieldDrift>,
    pub drift_count: usize,
    pub active_version: Option<u64>,
    pub reason: Option<String>,
}

// ============================================================================
// STATE
// ============================================================================

struct VersionRecord {
    snapshot: Arc<ConfigVersion>,
    state: VersionState,
    state_changed_at: DateTime<Utc>,
    impact: Option<ImpactReport>,
    deployment: Option<DeploymentRecord>,
}

impl VersionRecord {
    fn transition(&mut self, to: VersionState) {
        tracing::debug!(
            "{} v{}: {} -> {}",
            self.snapshot.namespace,
            self.snapshot.version,
            self.state,
            to
        );
        self.state = to;
        self.state_changed_at = Utc::now();
    }

    fn info(&self) -> VersionInfo {
        VersionInfo {
            config: (*self.snapshot).clone(),
            state: self.state,
            state_changed_at: self.state_changed_at,
            impact: self.impact.clone(),
            deployment: self.deployment.clone(),
        }
    }
}

struct Ledger {
    records: BTreeMap<u64, VersionRecord>,
    next_version: u64,
    active_version: Option<u64>,
}

struct Namespace {
    schema: NamespaceSchema,
    ledger: Mutex<Ledger>,
    active: RwLock<Option<Arc<ConfigVersion>>>,
}

impl Namespace {
    fn record_mut<'a>(
        &self,
        ledger: &'a mut Ledger,
        version: u64,
    ) -> Result<&'a mut VersionRecord, ConfigError> {
        ledger
            .records
            .get_mut(&version)
            .ok_or_else(|| ConfigError::UnknownVersion {
                namespace: self.schema.namespace.clone(),
                version,
            })
    }
}

fn verify(snapshot: &ConfigVersion) -> Result<(), ConfigError> {
    snapshot.verify().map_err(|computed| {
        tracing::error!(
            "Config drift detected: {} v{} hash {} != {}",
            snapshot.namespace,
            snapshot.version,
            snapshot.content_hash,
            computed
        );
        ConfigError::Drift {
            namespace: snapshot.namespace.clone(),
            version: snapshot.version,
            stored: snapshot.content_hash.clone(),
            computed,
        }
    })
}

// ============================================================================
// MANAGER
// ============================================================================

#[derive(Default)]
pub struct ConfigManager {
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_namespace(&self, schema: NamespaceSchema) -> Result<(), ConfigError> {
        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(&schema.namespace) {
            return Err(ConfigError::DuplicateNamespace(schema.namespace));
        }
        tracing::info!(
            "Registered config namespace '{}' ({} fields)",
            schema.namespace,
            schema.fields.len()
        );
        namespaces.insert(
            schema.namespace.clone(),
            Arc::new(Namespace {
                schema,
                ledger: Mutex::new(Ledger {
                    records: BTreeMap::new(),
                    next_version: 1,
                    active_version: None,
                }),
                active: RwLock::new(None),
            }),
        );
        Ok(())
    }

    fn namespace(&self, name: &str) -> Result<Arc<Namespace>, ConfigError> {
        self.namespaces
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownNamespace(name.to_string()))
    }

    /// Registered namespace names, sorted
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a DRAFT with the next version number (never reused)
    pub fn propose(
        &self,
        namespace: &str,
        params: ParamMap,
        author: &str,
    ) -> Result<Arc<ConfigVersion>, ConfigError> {
        let ns = self.namespace(namespace)?;
        let mut ledger = ns.ledger.lock();

        let version = ledger.next_version;
        ledger.next_version += 1;

        let snapshot = Arc::new(ConfigVersion::new(namespace, version, params, author));
        tracing::info!(
            "Proposed {} v{} by {} (hash {})",
            namespace,
            version,
            author,
            snapshot.content_hash
        );

        ledger.records.insert(
            version,
            VersionRecord {
                snapshot: Arc::clone(&snapshot),
                state: VersionState::Draft,
                state_changed_at: Utc::now(),
                impact: None,
                deployment: None,
            },
        );
        Ok(snapshot)
    }

    /// Schema check + impact diff. DRAFT -> APPROVED, or stays DRAFT on error.
    pub fn validate(&self, namespace: &str, version: u64) -> Result<ValidationOutcome, ConfigError> {
        let ns = self.namespace(namespace)?;
        let mut ledger = ns.ledger.lock();

        let current = ledger
            .active_version
            .and_then(|v| ledger.records.get(&v))
            .map(|r| Arc::clone(&r.snapshot));

        let record = ns.record_mut(&mut ledger, version)?;
        if record.state != VersionState::Draft {
            return Err(ConfigError::InvalidTransition {
                version,
                from: record.state,
                to: VersionState::Validating,
            });
        }
        verify(&record.snapshot)?;

        record.transition(VersionState::Validating);

        let errors = ns.schema.check(&record.snapshot.params);
        if !errors.is_empty() {
            record.transition(VersionState::Draft);
            tracing::warn!("{} v{} failed validation: {:?}", namespace, version, errors);
            return Err(ConfigError::Validation { errors });
        }

        let impact = current.map(|c| assess_impact(&ns.schema, &c.params, &record.snapshot.params));
        let warnings = impact.as_ref().map(ImpactReport::warnings).unwrap_or_default();
        for warning in &warnings {
            tracing::warn!("{} v{}: {}", namespace, version, warning);
        }

        record.impact = impact.clone();
        record.transition(VersionState::Approved);
        tracing::info!("{} v{} approved", namespace, version);

        Ok(ValidationOutcome {
            version,
            state: record.state,
            content_hash: record.snapshot.content_hash.clone(),
            impact,
            warnings,
        })
    }

    /// APPROVED -> DEPLOYING -> ACTIVE; previous ACTIVE -> DEPRECATED.
    /// The active pointer is swapped once, whatever the strategy.
    pub fn deploy(
        &self,
        namespace: &str,
        version: u64,
        strategy: DeployStrategy,
    ) -> Result<Arc<ConfigVersion>, ConfigError> {
        strategy.check().map_err(ConfigError::InvalidStrategy)?;

        let ns = self.namespace(namespace)?;
        let mut ledger = ns.ledger.lock();
        let previous = ledger.active_version;

        let record = ns.record_mut(&mut ledger, version)?;
        if record.state != VersionState::Approved {
            return Err(ConfigError::InvalidTransition {
                version,
                from: record.state,
                to: VersionState::Deploying,
            });
        }
        verify(&record.snapshot)?;

        record.transition(VersionState::Deploying);
        tracing::info!("Deploying {} v{} using {} strategy", namespace, version, strategy);

        let snapshot = Arc::clone(&record.snapshot);
        record.deployment = Some(DeploymentRecord {
            strategy,
            activated_at: Utc::now(),
            replaced: previous,
            rollback: false,
        });
        record.transition(VersionState::Active);

        if let Some(prev) = previous {
            if let Some(old) = ledger.records.get_mut(&prev) {
                old.transition(VersionState::Deprecated);
            }
        }
        ledger.active_version = Some(version);
        *ns.active.write() = Some(Arc::clone(&snapshot));

        tracing::info!(
            "{} v{} is ACTIVE (replaced {:?}, hash {})",
            namespace,
            version,
            previous,
            snapshot.content_hash
        );
        Ok(snapshot)
    }

    /// Reinstate a DEPRECATED version; the current ACTIVE becomes ROLLED_BACK
    pub fn rollback(&self, namespace: &str, to_version: u64) -> Result<Arc<ConfigVersion>, ConfigError> {
        let ns = self.namespace(namespace)?;
        let mut ledger = ns.ledger.lock();

        let current = ledger
            .active_version
            .ok_or_else(|| ConfigError::NoActiveVersion(namespace.to_string()))?;

        let target = ns.record_mut(&mut ledger, to_version)?;
        if target.state != VersionState::Deprecated {
            return Err(ConfigError::InvalidTransition {
                version: to_version,
                from: target.state,
                to: VersionState::Active,
            });
        }
        verify(&target.snapshot)?;

        tracing::warn!("Rolling back {} from v{} to v{}", namespace, current, to_version);

        let snapshot = Arc::clone(&target.snapshot);
        target.deployment = Some(DeploymentRecord {
            strategy: DeployStrategy::Immediate,
            activated_at: Utc::now(),
            replaced: Some(current),
            rollback: true,
        });
        target.transition(VersionState::Active);

        if let Some(old) = ledger.records.get_mut(&current) {
            old.transition(VersionState::RolledBack);
        }
        ledger.active_version = Some(to_version);
        *ns.active.write() = Some(Arc::clone(&snapshot));

        Ok(snapshot)
    }

    /// Roll back to the most recently deprecated version
    pub fn rollback_previous(&self, namespace: &str) -> Result<Arc<ConfigVersion>, ConfigError> {
        let ns = self.namespace(namespace)?;
        let target = ns
            .ledger
            .lock()
            .records
            .values()
            .filter(|r| r.state == VersionState::Deprecated)
            .max_by_key(|r| (r.state_changed_at, r.snapshot.version))
            .map(|r| r.snapshot.version);

        match target {
            Some(version) => self.rollback(namespace, version),
            None => Err(ConfigError::NothingToRollBack(namespace.to_string())),
        }
    }

    /// Current ACTIVE version, hash-verified
    pub fn active(&self, namespace: &str) -> Result<Arc<ConfigVersion>, ConfigError> {
        let ns = self.namespace(namespace)?;
        let active = ns
            .active
            .read()
            .clone()
            .ok_or_else(|| ConfigError::NoActiveVersion(namespace.to_string()))?;
        verify(&active)?;
        Ok(active)
    }

    pub fn get(&self, namespace: &str, version: u64) -> Result<VersionInfo, ConfigError> {
        let ns = self.namespace(namespace)?;
        let mut ledger = ns.ledger.lock();
        let record = ns.record_mut(&mut ledger, version)?;
        verify(&record.snapshot)?;
        Ok(record.info())
    }

    /// All versions, ascending
    pub fn versions(&self, namespace: &str) -> Result<Vec<VersionInfo>, ConfigError> {
        let ns = self.namespace(namespace)?;
        let ledger = ns.ledger.lock();
        ledger
            .records
            .values()
            .map(|r| verify(&r.snapshot).map(|_| r.info()))
            .collect()
    }

    /// Compare parameters observed in production with the ACTIVE version
    pub fn detect_drift(&self, namespace: &str, observed: &ParamMap) -> Result<DriftReport, ConfigError> {
        let active = match self.active(namespace) {
            Ok(active) => active,
            Err(ConfigError::NoActiveVersion(_)) => {
                return Ok(DriftReport {
                    drift_detected: false,
                    drifts: Vec::new(),
                    drift_count: 0,
                    active_version: None,
                    reason: Some("no_active_version".to_string()),
                })
            }
            Err(e) => return Err(e),
        };

        let drifts: Vec<FieldDrift> = active
            .params
            .iter()
            .filter(|(key, expected)| observed.get(*key) != Some(*expected))
            .map(|(key, expected)| FieldDrift {
                field: key.clone(),
                expected: Some(expected.clone()),
                observed: observed.get(key).cloned(),
            })
            .collect();

        if !drifts.is_empty() {
            tracing::warn!(
                "Drift in {} v{}: {} field(s) differ",
                namespace,
                active.version,
                drifts.len()
            );
        }

        Ok(DriftReport {
            drift_detected: !drifts.is_empty(),
            drift_count: drifts.len(),
            drifts,
            active_version: Some(active.version),
            reason: None,
        })
    }
}
