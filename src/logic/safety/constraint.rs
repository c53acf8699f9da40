//! Safety Constraints
//!
//! Declarative, stateless rules evaluated against one model output.
//! Range checks distinguish soft (within 2x of the bound) from hard breaches;
//! relational checks have no "soft" notion and always breach hard.

use serde::{Deserialize, Serialize};

use super::types::SafetyLevel;
use crate::logic::model::{ModelCategory, ModelOutput};

// ============================================================================
// CONSTRAINT TYPES
// ============================================================================

/// How a breach maps to a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintLevel {
    /// "Should" rule: any breach is a WARNING
    Advisory,
    /// Soft breach -> WARNING, hard breach -> UNSAFE
    Guard,
    /// Absolute safety invariant: any breach is CRITICAL
    Invariant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintCheck {
    /// min <= field <= max (either side optional)
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// lesser <= greater (or < when strict)
    Ordered {
        lesser: String,
        greater: String,
        strict: bool,
    },
    /// sum(fields) <= limit
    SumAtMost { fields: Vec<String>, limit: f64 },
    /// field == value  =>  then_field == then_value
    Requires {
        field: String,
        value: String,
        then_field: String,
        then_value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub category: ModelCategory,
    pub level: ConstraintLevel,
    pub check: ConstraintCheck,
    pub description: String,
}

/// Breach severity before the constraint level is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    Soft,
    Hard,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Pass,
    Violated(Breach),
    /// Cannot evaluate (required field absent or of the wrong type)
    Skipped(String),
}

// ============================================================================
// BUILDERS
// ============================================================================

impl Constraint {
    fn new(name: &str, category: ModelCategory, check: ConstraintCheck) -> Self {
        Self {
            name: name.to_string(),
            category,
            level: ConstraintLevel::Guard,
            check,
            description: String::new(),
        }
    }

    pub fn range(name: &str, category: ModelCategory, field: &str, min: f64, max: f64) -> Self {
        Self::new(
            name,
            category,
            ConstraintCheck::Range {
                field: field.to_string(),
                min: Some(min),
                max: Some(max),
            },
        )
    }

    pub fn at_most(name: &str, category: ModelCategory, field: &str, max: f64) -> Self {
        Self::new(
            name,
            category,
            ConstraintCheck::Range {
                field: field.to_string(),
                min: None,
                max: Some(max),
            },
        )
    }

    pub fn at_least(name: &str, category: ModelCategory, field: &str, min: f64) -> Self {
        Self::new(
            name,
            category,
            ConstraintCheck::Range {
                field: field.to_string(),
                min: Some(min),
                max: None,
            },
        )
    }

    /// lesser <= greater
    pub fn ordered(name: &str, category: ModelCategory, lesser: &str, greater: &str) -> Self {
        Self::new(
            name,
            category,
            ConstraintCheck::Ordered {
                lesser: lesser.to_string(),
                greater: greater.to_string(),
                strict: false,
            },
        )
    }

    pub fn sum_at_most(name: &str, category: ModelCategory, fields: &[&str], limit: f64) -> Self {
        Self::new(
            name,
            category,
            ConstraintCheck::SumAtMost {
                fields: fields.iter().map(|s| s.to_string()).collect(),
                limit,
            },
        )
    }

    pub fn requires(
        name: &str,
        category: ModelCategory,
        (field, value): (&str, &str),
        (then_field, then_value): (&str, &str),
    ) -> Self {
        Self::new(
            name,
            category,
            ConstraintCheck::Requires {
                field: field.to_string(),
                value: value.to_string(),
                then_field: then_field.to_string(),
                then_value: then_value.to_string(),
            },
        )
    }

    pub fn strict(mut self) -> Self {
        if let ConstraintCheck::Ordered { strict, .. } = &mut self.check {
            *strict = true;
        }
        self
    }

    pub fn advisory(mut self) -> Self {
        self.level = ConstraintLevel::Advisory;
        self
    }

    pub fn invariant(mut self) -> Self {
        self.level = ConstraintLevel::Invariant;
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

impl Constraint {
    /// Stateless evaluation; never panics, never fails the request
    pub fn evaluate(&self, output: &ModelOutput) -> Evaluation {
        match &self.check {
            ConstraintCheck::Range { field, min, max } => {
                let value = match numeric(output, field) {
                    Ok(v) => v,
                    Err(reason) => return Evaluation::Skipped(reason),
                };
                if !value.is_finite() {
                    return Evaluation::Violated(Breach::Hard);
                }
                if let Some(max) = max {
                    if value > *max {
                        return Evaluation::Violated(upper_breach(value, *max));
                    }
                }
                if let Some(min) = min {
                    if value < *min {
                        return Evaluation::Violated(lower_breach(value, *min));
                    }
                }
                Evaluation::Pass
            }

            ConstraintCheck::Ordered { lesser, greater, strict } => {
                let (a, b) = match (numeric(output, lesser), numeric(output, greater)) {
                    (Ok(a), Ok(b)) => (a, b),
                    (Err(reason), _) | (_, Err(reason)) => return Evaluation::Skipped(reason),
                };
                let holds = if *strict { a < b } else { a <= b };
                if holds {
                    Evaluation::Pass
                } else {
                    Evaluation::Violated(Breach::Hard)
                }
            }

            ConstraintCheck::SumAtMost { fields, limit } => {
                let mut sum = 0.0;
                for field in fields {
                    match numeric(output, field) {
                        Ok(v) => sum += v,
                        Err(reason) => return Evaluation::Skipped(reason),
                    }
                }
                if sum <= *limit {
                    Evaluation::Pass
                } else {
                    Evaluation::Violated(Breach::Hard)
                }
            }

            ConstraintCheck::Requires { field, value, then_field, then_value } => {
                let Some(actual) = output.get(field) else {
                    return Evaluation::Skipped(format!("field '{}' absent", field));
                };
                if actual.to_string() != *value {
                    return Evaluation::Pass;
                }
                match output.get(then_field) {
                    Some(v) if v.to_string() == *then_value => Evaluation::Pass,
                    Some(_) => Evaluation::Violated(Breach::Hard),
                    None => Evaluation::Skipped(format!("field '{}' absent", then_field)),
                }
            }
        }
    }

    /// Verdict level for a breach of this constraint
    pub fn severity(&self, breach: Breach) -> SafetyLevel {
        match (self.level, breach) {
            (ConstraintLevel::Advisory, _) => SafetyLevel::Warning,
            (ConstraintLevel::Guard, Breach::Soft) => SafetyLevel::Warning,
            (ConstraintLevel::Guard, Breach::Hard) => SafetyLevel::Unsafe,
            (ConstraintLevel::Invariant, _) => SafetyLevel::Critical,
        }
    }
}

fn numeric(output: &ModelOutput, field: &str) -> Result<f64, String> {
    match output.get(field) {
        None => Err(format!("field '{}' absent", field)),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| format!("field '{}' is not numeric", field)),
    }
}

/// Soft while value <= 2 * max (positive bounds only)
fn upper_breach(value: f64, max: f64) -> Breach {
    if max > 0.0 && value <= max * 2.0 {
        Breach::Soft
    } else {
        Breach::Hard
    }
}

/// Soft while value >= min / 2 (positive bounds only)
fn lower_breach(value: f64, min: f64) -> Breach {
    if min > 0.0 && value >= min / 2.0 {
        Breach::Soft
    } else {
        Breach::Hard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::OutputValue;

    fn int(v: i64) -> OutputValue {
        OutputValue::Integer(v)
    }

    fn num(v: f64) -> OutputValue {
        OutputValue::Number(v)
    }

    fn text(v: &str) -> OutputValue {
        OutputValue::Text(v.to_string())
    }

    fn output(pairs: &[(&str, OutputValue)]) -> ModelOutput {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_range_soft_and_hard() {
        let c = Constraint::at_most("autoscale", ModelCategory::Performance, "workers", 50.0);

        let ok = output(&[("workers", int(50))]);
        let soft = output(&[("workers", int(100))]);
        let hard = output(&[("workers", int(101))]);

        assert_eq!(c.evaluate(&ok), Evaluation::Pass);
        assert_eq!(c.evaluate(&soft), Evaluation::Violated(Breach::Soft));
        assert_eq!(c.evaluate(&hard), Evaluation::Violated(Breach::Hard));
        assert_eq!(c.severity(Breach::Soft), SafetyLevel::Warning);
        assert_eq!(c.severity(Breach::Hard), SafetyLevel::Unsafe);
    }

    #[test]
    fn test_lower_bound_breach() {
        let c = Constraint::range("workers", ModelCategory::Capacity, "w", 10.0, 100.0);
        assert_eq!(c.evaluate(&output(&[("w", int(5))])), Evaluation::Violated(Breach::Soft));
        assert_eq!(c.evaluate(&output(&[("w", int(4))])), Evaluation::Violated(Breach::Hard));

        let zero = Constraint::at_least("non_negative", ModelCategory::Capacity, "w", 0.0);
        assert_eq!(zero.evaluate(&output(&[("w", int(-1))])), Evaluation::Violated(Breach::Hard));
    }

    #[test]
    fn test_non_finite_is_hard() {
        let c = Constraint::at_most("x", ModelCategory::Risk, "x", 1.0);
        assert_eq!(
            c.evaluate(&output(&[("x", num(f64::NAN))])),
            Evaluation::Violated(Breach::Hard)
        );
    }

    #[test]
    fn test_ordered() {
        let c = Constraint::ordered("p95_below_p99", ModelCategory::Performance, "p95", "p99");
        assert_eq!(c.evaluate(&output(&[("p95", int(300)), ("p99", int(300))])), Evaluation::Pass);
        assert_eq!(
            c.evaluate(&output(&[("p95", int(301)), ("p99", int(300))])),
            Evaluation::Violated(Breach::Hard)
        );

        let strict = c.clone().strict();
        assert_eq!(
            strict.evaluate(&output(&[("p95", int(300)), ("p99", int(300))])),
            Evaluation::Violated(Breach::Hard)
        );
    }

    #[test]
    fn test_missing_field_is_skipped_not_violated() {
        let c = Constraint::ordered("p95_below_p99", ModelCategory::Performance, "p95", "p99");
        assert!(matches!(c.evaluate(&output(&[("p95", int(1))])), Evaluation::Skipped(_)));

        let on_text = Constraint::at_most("x", ModelCategory::Risk, "action", 1.0);
        assert!(matches!(
            on_text.evaluate(&output(&[("action", text("admit"))])),
            Evaluation::Skipped(_)
        ));
    }

    #[test]
    fn test_requires_and_sum() {
        let c = Constraint::requires(
            "require_persistence",
            ModelCategory::Risk,
            ("alert_level", "critical"),
            ("persistence_required", "yes"),
        );
        let ok = output(&[("alert_level", text("critical")), ("persistence_required", text("yes"))]);
        let bad = output(&[("alert_level", text("critical")), ("persistence_required", text("no"))]);
        let other = output(&[("alert_level", text("normal"))]);
        assert_eq!(c.evaluate(&ok), Evaluation::Pass);
        assert_eq!(c.evaluate(&bad), Evaluation::Violated(Breach::Hard));
        assert_eq!(c.evaluate(&other), Evaluation::Pass);

        let sum = Constraint::sum_at_most("budget", ModelCategory::Tuning, &["a", "b"], 10.0);
        assert_eq!(sum.evaluate(&output(&[("a", int(4)), ("b", int(6))])), Evaluation::Pass);
        assert_eq!(
            sum.evaluate(&output(&[("a", int(4)), ("b", num(6.5))])),
            Evaluation::Violated(Breach::Hard)
        );
    }

    #[test]
    fn test_levels() {
        let adv = Constraint::at_most("x", ModelCategory::Risk, "x", 1.0).advisory();
        let inv = Constraint::at_most("x", ModelCategory::Risk, "x", 1.0).invariant();
        assert_eq!(adv.severity(Breach::Hard), SafetyLevel::Warning);
        assert_eq!(inv.severity(Breach::Soft), SafetyLevel::Critical);
    }
}
