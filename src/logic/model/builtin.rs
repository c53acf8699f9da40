//! Built-in Closed-Form Models
//!
//! Placeholder formulas standing in for trained models (Prophet, quantile
//! regression, EVT, BOCPD, bandits, Bayesian optimisation). Each one honours
//! the same `InferenceModel` contract a real model would.

use std::sync::Arc;

use super::descriptor::{ModelCategory, ModelDescriptor, ModelInputs, ModelOutput};
use super::inference::{input, InferenceError, InferenceModel};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Requests/sec one worker can absorb
const THROUGHPUT_PER_WORKER: f64 = 100.0;

/// Headroom applied on top of the raw worker estimate
const CAPACITY_SAFETY_MARGIN: f64 = 1.2;

/// Fraction of next-hour workers kept over a full day
const DAILY_UTILIZATION: f64 = 0.85;

/// p99 latency (ms) above which the tail controller autoscales
const AUTOSCALE_P99_MS: f64 = 500.0;

/// EVT threshold / shape / scale for the extreme-events model
const EVT_THRESHOLD: f64 = 0.9;
const EVT_SHAPE: f64 = 0.2;
const EVT_SCALE: f64 = 0.05;

fn fields(descriptor: &ModelDescriptor) -> Vec<String> {
    descriptor.output_labels.keys().cloned().collect()
}

// ============================================================================
// CAPACITY PLANNING
// ============================================================================

/// Worker / queue forecast from ingest rate, CPU, latency and calendar load
pub struct CapacityPlanner;

impl CapacityPlanner {
    pub fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("capacity_planning", "Capacity Planning", ModelCategory::Capacity)
            .input("ingest_rate", 0.0, 100_000.0, 1200.0)
            .input("cpu", 0.0, 1.0, 0.65)
            .input("p99", 0.0, 10_000.0, 350.0)
            .input("calendar_events", 0.0, 10.0, 0.0)
            .output("next_hour_workers", "Next Hour Workers")
            .output("next_day_target", "Next Day Target")
            .output("queue_capacity", "Queue Capacity")
            .output("predicted_request_rate", "Predicted Request Rate")
            .output("confidence_lower", "Confidence Lower")
            .output("confidence_upper", "Confidence Upper")
            .output("action", "Action")
            .guardrail("worker_count_reasonable")
            .guardrail("worker_count_ceiling")
            .guardrail("queue_capacity_reasonable")
            .guardrail("confidence_band_ordered")
    }
}

impl InferenceModel for CapacityPlanner {
    fn output_fields(&self) -> Vec<String> {
        fields(&Self::descriptor())
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError> {
        let ingest_rate = input(inputs, "ingest_rate");
        let cpu = input(inputs, "cpu");
        let p99 = input(inputs, "p99");
        let events = input(inputs, "calendar_events");

        let event_factor = 1.0 + 0.2 * events;
        let cpu_factor = 1.0 + (cpu - 0.7).max(0.0);
        let latency_factor = if p99 > AUTOSCALE_P99_MS { 1.15 } else { 1.0 };

        let predicted_rate = ingest_rate * event_factor;
        let raw_workers = predicted_rate / THROUGHPUT_PER_WORKER
            * CAPACITY_SAFETY_MARGIN
            * cpu_factor
            * latency_factor;

        let next_hour_workers = (raw_workers.ceil() as i64).max(1);
        let next_day_target = (next_hour_workers as f64 * 24.0 * DAILY_UTILIZATION).round() as i64;
        let queue_capacity = ((ingest_rate * 1.5).round() as i64).max(100);

        let action = if cpu > 0.8 || p99 > AUTOSCALE_P99_MS {
            "scale_up_with_approval"
        } else {
            "schedule_apply_cap_deltas"
        };

        let mut out = ModelOutput::new();
        out.insert("next_hour_workers".into(), next_hour_workers.into());
        out.insert("next_day_target".into(), next_day_target.into());
        out.insert("queue_capacity".into(), queue_capacity.into());
        out.insert("predicted_request_rate".into(), round2(predicted_rate).into());
        out.insert("confidence_lower".into(), round2(predicted_rate * 0.9).into());
        out.insert("confidence_upper".into(), round2(predicted_rate * 1.1).into());
        out.insert("action".into(), action.into());
        Ok(out)
    }
}

// ============================================================================
// TAIL SLO CONTROL
// ============================================================================

/// Tail latency quantiles + admission / autoscale decision
pub struct TailSloController;

impl TailSloController {
    pub fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("tail_slo", "Tail SLO Control", ModelCategory::Performance)
            .input("load", 0.0, 1.0, 0.7)
            .input("infra", 0.0, 1.0, 0.6)
            .input("request_rate", 0.0, 100_000.0, 1000.0)
            .input("error_rate", 0.0, 1.0, 0.01)
            .output("p95_pred", "P95 Prediction (ms)")
            .output("p99_pred", "P99 Prediction (ms)")
            .output("p99_9_pred", "P99.9 Prediction (ms)")
            .output("action", "Action")
            .output("autoscale_workers", "Autoscale Workers")
            .output("historic_comparison", "Historic Comparison")
            .output("confidence_interval_width", "Confidence Interval Width")
            .guardrail("latency_predictions_reasonable")
            .guardrail("autoscale_within_limits")
            .guardrail("autoscale_absolute_ceiling")
            .guardrail("p95_below_p99")
            .guardrail("p99_below_p99_9")
    }
}

impl InferenceModel for TailSloController {
    fn output_fields(&self) -> Vec<String> {
        fields(&Self::descriptor())
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError> {
        let load = input(inputs, "load");
        let infra = input(inputs, "infra");
        let request_rate = input(inputs, "request_rate");
        let error_rate = input(inputs, "error_rate");

        let p95 = 120.0 + 280.0 * load + 150.0 * infra + 2000.0 * error_rate;
        let p99 = p95 * (1.35 + 0.25 * load);
        let p99_9 = p99 * 1.5;

        let (action, autoscale_workers) = if p99 > AUTOSCALE_P99_MS {
            let workers = (request_rate * (p99 / AUTOSCALE_P99_MS) / THROUGHPUT_PER_WORKER).ceil();
            ("autoscale", (workers as i64).max(1))
        } else if p95 > 350.0 {
            ("admit_throttle", 0)
        } else {
            ("admit", 0)
        };

        let mut out = ModelOutput::new();
        out.insert("p95_pred".into(), (p95.round() as i64).into());
        out.insert("p99_pred".into(), (p99.round() as i64).into());
        out.insert("p99_9_pred".into(), (p99_9.round() as i64).into());
        out.insert("action".into(), action.into());
        out.insert("autoscale_workers".into(), autoscale_workers.into());
        out.insert(
            "historic_comparison".into(),
            if p99 > 450.0 { "above_historic" } else { "within_historic" }.into(),
        );
        out.insert(
            "confidence_interval_width".into(),
            (((p99 - p95) * 0.8).round() as i64).into(),
        );
        Ok(out)
    }
}

// ============================================================================
// EXTREME EVENTS (EVT / POT)
// ============================================================================

/// Peaks-over-threshold tail probability with a generalised Pareto tail
pub struct ExtremeEventDetector;

impl ExtremeEventDetector {
    pub fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("extreme_events", "Extreme Events Detection", ModelCategory::Risk)
            .input("exceedances", 0.0, 1000.0, 3.0)
            .input("window_size", 1.0, 100_000.0, 1000.0)
            .input("current_value", 0.0, 10.0, 0.95)
            .output("tail_probability", "Tail Probability")
            .output("return_period", "Return Period (obs)")
            .output("alert_level", "Alert Level")
            .output("persistence_required", "Persistence Required")
            .guardrail("tail_probability_bounded")
            .guardrail("require_persistence")
    }
}

impl InferenceModel for ExtremeEventDetector {
    fn output_fields(&self) -> Vec<String> {
        fields(&Self::descriptor())
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError> {
        let exceedances = input(inputs, "exceedances");
        let window = input(inputs, "window_size");
        let current = input(inputs, "current_value");

        if window <= 0.0 {
            return Err(InferenceError("window_size must be positive".to_string()));
        }

        let rate = exceedances / window;
        let tail_probability = if current > EVT_THRESHOLD {
            let z = 1.0 + EVT_SHAPE * (current - EVT_THRESHOLD) / EVT_SCALE;
            rate * z.powf(-1.0 / EVT_SHAPE)
        } else {
            rate
        };

        let return_period = if tail_probability > 0.0 {
            (1.0 / tail_probability).min(1e9)
        } else {
            1e9
        };

        let alert_level = if current > EVT_THRESHOLD && tail_probability < 0.001 {
            "critical"
        } else if current > EVT_THRESHOLD {
            "warning"
        } else {
            "normal"
        };
        let persistence = if alert_level == "normal" { "no" } else { "yes" };

        let mut out = ModelOutput::new();
        out.insert("tail_probability".into(), tail_probability.into());
        out.insert("return_period".into(), return_period.round().into());
        out.insert("alert_level".into(), alert_level.into());
        out.insert("persistence_required".into(), persistence.into());
        Ok(out)
    }
}

// ============================================================================
// REGIME DETECTION (BOCPD)
// ============================================================================

/// Change-point probability from latency drift over the observation window
pub struct RegimeDetector;

impl RegimeDetector {
    pub fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("regime_detection", "Regime Detection", ModelCategory::Detection)
            .input("latency", 0.0, 10_000.0, 250.0)
            .input("baseline_latency", 1.0, 10_000.0, 250.0)
            .input("window_observations", 1.0, 10_000.0, 100.0)
            .output("change_probability", "Change Probability")
            .output("run_length", "Run Length")
            .output("regime", "Regime")
            .guardrail("change_probability_bounded")
            .guardrail("run_length_non_negative")
    }
}

impl InferenceModel for RegimeDetector {
    fn output_fields(&self) -> Vec<String> {
        fields(&Self::descriptor())
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError> {
        let latency = input(inputs, "latency");
        let baseline = input(inputs, "baseline_latency").max(1.0);
        let window = input(inputs, "window_observations");

        // Logistic on relative drift, sharpened by longer windows
        let drift = (latency - baseline) / baseline;
        let sharpness = 4.0 + window.ln().max(0.0);
        let change_probability = 1.0 / (1.0 + (-(drift.abs() - 0.25) * sharpness).exp());

        let run_length = ((1.0 - change_probability) * window).round() as i64;
        let regime = if change_probability > 0.5 { "shifted" } else { "stable" };

        let mut out = ModelOutput::new();
        out.insert("change_probability".into(), round4(change_probability).into());
        out.insert("run_length".into(), run_length.into());
        out.insert("regime".into(), regime.into());
        Ok(out)
    }
}

// ============================================================================
// ONLINE TUNING (CONTEXTUAL BANDIT)
// ============================================================================

/// UCB-style config selection with canary sizing
pub struct TuningBandit;

impl TuningBandit {
    pub fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("bandit", "Online Tuning (Bandits)", ModelCategory::Tuning)
            .input("canary_metric", 0.0, 1.0, 0.4)
            .input("num_configs", 1.0, 50.0, 5.0)
            .input("exploration_factor", 0.0, 1.0, 0.2)
            .output("best_config_id", "Best Config")
            .output("canary_percentage", "Canary %")
            .output("canary_health", "Canary Health")
            .output("freeze_on_anomaly", "Freeze On Anomaly")
            .output("action", "Action")
            .guardrail("canary_percentage_safe")
            .guardrail("freeze_on_low_metric")
    }
}

impl InferenceModel for TuningBandit {
    fn output_fields(&self) -> Vec<String> {
        fields(&Self::descriptor())
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError> {
        let metric = input(inputs, "canary_metric");
        let configs = input(inputs, "num_configs").max(1.0);
        let exploration = input(inputs, "exploration_factor");

        let best_config_id = 1 + (metric * (configs - 1.0)).floor() as i64;
        let canary_percentage = (exploration * 25.0 * metric).round() as i64;
        let low = metric < 0.2;
        let action = if exploration > 0.5 { "explore" } else { "exploit" };

        let mut out = ModelOutput::new();
        out.insert("best_config_id".into(), best_config_id.into());
        out.insert("canary_percentage".into(), canary_percentage.into());
        out.insert("canary_health".into(), if low { "low" } else { "ok" }.into());
        out.insert("freeze_on_anomaly".into(), if low { "yes" } else { "no" }.into());
        out.insert("action".into(), action.into());
        Ok(out)
    }
}

// ============================================================================
// OFFLINE OPTIMISATION (BAYESIAN)
// ============================================================================

/// Suggests batch size / timeout from the current latency and success rate
pub struct ParameterOptimizer;

impl ParameterOptimizer {
    pub fn descriptor() -> ModelDescriptor {
        ModelDescriptor::new("bayes_opt", "Offline Optimization", ModelCategory::Optimization)
            .input("latency", 0.0, 10_000.0, 250.0)
            .input("success_rate", 0.0, 1.0, 0.95)
            .input("iteration", 1.0, 1000.0, 1.0)
            .output("suggested_batch_size", "Suggested Batch Size")
            .output("suggested_timeout_ms", "Suggested Timeout (ms)")
            .output("expected_improvement", "Expected Improvement")
            .guardrail("timeout_reasonable")
            .guardrail("batch_size_reasonable")
    }
}

impl InferenceModel for ParameterOptimizer {
    fn output_fields(&self) -> Vec<String> {
        fields(&Self::descriptor())
    }

    fn infer(&self, inputs: &ModelInputs) -> Result<ModelOutput, InferenceError> {
        let latency = input(inputs, "latency");
        let success = input(inputs, "success_rate");
        let iteration = input(inputs, "iteration").max(1.0);

        let batch = (64.0 * success * (250.0 / latency.max(1.0)).sqrt()).round() as i64;
        let timeout = (latency * 4.0).round().max(100.0) as i64;
        let expected_improvement = (1.0 - success) / iteration.sqrt();

        let mut out = ModelOutput::new();
        out.insert("suggested_batch_size".into(), batch.max(1).into());
        out.insert("suggested_timeout_ms".into(), timeout.into());
        out.insert("expected_improvement".into(), round4(expected_improvement).into());
        Ok(out)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// All built-in models with their descriptors, in registration order
pub fn builtin_models() -> Vec<(ModelDescriptor, Arc<dyn InferenceModel>)> {
    vec![
        (CapacityPlanner::descriptor(), Arc::new(CapacityPlanner)),
        (TailSloController::descriptor(), Arc::new(TailSloController)),
        (ExtremeEventDetector::descriptor(), Arc::new(ExtremeEventDetector)),
        (RegimeDetector::descriptor(), Arc::new(RegimeDetector)),
        (TuningBandit::descriptor(), Arc::new(TuningBandit)),
        (ParameterOptimizer::descriptor(), Arc::new(ParameterOptimizer)),
    ]
}
