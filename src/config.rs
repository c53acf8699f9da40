//! Configuration module

use std::env;

use crate::logic::control::ControlSettings;
use crate::logic::defaults::{MAX_ESCALATION_THRESHOLD, MAX_ESCALATION_WINDOW_SECS};
use crate::logic::pipeline::PipelinePolicy;
use crate::logic::safety::SafetyPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Log output format (text, json)
    pub log_format: String,

    /// Violation ring-buffer capacity
    pub violation_log_capacity: usize,

    /// Consecutive UNSAFE verdicts that escalate to CRITICAL
    pub escalation_threshold: usize,

    /// Trailing window for the escalation streak
    pub escalation_window_secs: i64,

    /// TTL for features produced by refresh
    pub feature_ttl_secs: u64,

    /// Feature refresh period (0 disables the background loop)
    pub refresh_interval_secs: u64,

    /// Fixed telemetry values, `name=value` pairs separated by commas
    pub static_features: Vec<(String, f64)>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 8080),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "text".to_string()),

            violation_log_capacity: parsed("VIOLATION_LOG_CAPACITY", 1000),

            escalation_threshold: clamp_setting(
                "ESCALATION_THRESHOLD",
                parsed("ESCALATION_THRESHOLD", 3),
                1,
                MAX_ESCALATION_THRESHOLD,
            ) as usize,

            escalation_window_secs: clamp_setting(
                "ESCALATION_WINDOW_SECS",
                parsed("ESCALATION_WINDOW_SECS", 60),
                1,
                MAX_ESCALATION_WINDOW_SECS,
            ),

            feature_ttl_secs: parsed("FEATURE_TTL_SECS", 300),

            refresh_interval_secs: parsed("REFRESH_INTERVAL_SECS", 30),

            static_features: env::var("STATIC_FEATURES")
                .map(|s| parse_static_features(&s))
                .unwrap_or_default(),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Startup parameters for the control plane
    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            safety: SafetyPolicy {
                escalation_threshold: self.escalation_threshold,
                escalation_window_secs: self.escalation_window_secs,
            }
            .normalized(),
            pipeline: PipelinePolicy::default(),
            violation_log_capacity: self.violation_log_capacity,
            feature_ttl_secs: self.feature_ttl_secs,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Keep a numeric setting inside the bounds its config namespace accepts
fn clamp_setting(key: &str, value: i64, min: i64, max: i64) -> i64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!("{}={} out of range {}..={}, using {}", key, value, min, max, clamped);
    }
    clamped
}

/// `cpu=0.62, ingest_rate=1400` -> pairs; malformed entries are dropped with a warning
pub fn parse_static_features(raw: &str) -> Vec<(String, f64)> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| match parse_static_feature(pair) {
            Ok(feature) => Some(feature),
            Err(reason) => {
                tracing::warn!("Ignoring STATIC_FEATURES entry '{}': {}", pair, reason);
                None
            }
        })
        .collect()
}

fn parse_static_feature(pair: &str) -> Result<(String, f64), String> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| "expected name=value".to_string())?;
    let name = name.trim();
    if name.is_empty() {
        return Err("empty name".to_string());
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("unparsable value '{}'", value.trim()))?;
    if !value.is_finite() {
        return Err(format!("non-finite value {}", value));
    }
    Ok((name.to_string(), value))
}
