//! Result normalization
//!
//! Maps the model's raw fields (`prediction`, `tumor_type`, `probability`)
//! into a [`PredictionOutcome`]. Out-of-range probabilities follow the
//! configured [`ProbabilityPolicy`].

use crate::config::ProbabilityPolicy;
use crate::error::NormalizationError;
use crate::invoker::RawModelOutput;
use crate::types::{ClassProbabilities, PredictionOutcome, TumorType};
use serde_json::Value;

/// Normalizer bound to a probability policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    policy: ProbabilityPolicy,
}

impl Normalizer {
    /// Create normalizer
    #[inline]
    #[must_use]
    pub fn new(policy: ProbabilityPolicy) -> Self {
        Self { policy }
    }

    /// Shape raw model output into a prediction outcome
    ///
    /// # Errors
    /// - `MissingField` when `prediction`, `tumor_type` or `probability` is absent
    /// - `InvalidField` when one of them has the wrong type or label
    /// - `ProbabilityOutOfRange` under [`ProbabilityPolicy::Reject`]
    pub fn normalize(&self, raw: &RawModelOutput) -> Result<PredictionOutcome, NormalizationError> {
        let prediction = label(required(raw, "prediction")?)?;

        let tumor_type = required(raw, "tumor_type")?
            .as_str()
            .ok_or_else(|| invalid("tumor_type", "expected a string"))?
            .parse::<TumorType>()
            .map_err(|e| invalid("tumor_type", e))?;

        let probability = required(raw, "probability")?
            .as_f64()
            .ok_or_else(|| invalid("probability", "expected a number"))?;

        Ok(PredictionOutcome {
            prediction,
            tumor_type,
            probability: self.apply_policy(probability)?,
            probabilities: raw.get("probabilities").and_then(class_probabilities),
        })
    }

    fn apply_policy(&self, p: f64) -> Result<f64, NormalizationError> {
        match self.policy {
            ProbabilityPolicy::PassThrough => Ok(p),
            ProbabilityPolicy::Reject if (0.0..=1.0).contains(&p) => Ok(p),
            ProbabilityPolicy::Reject => Err(NormalizationError::ProbabilityOutOfRange(p)),
            ProbabilityPolicy::Clamp => Ok(p.clamp(0.0, 1.0)),
        }
    }
}

/// Normalize with the pass-through policy
///
/// # Errors
/// See [`Normalizer::normalize`].
#[inline]
pub fn normalize(raw: &RawModelOutput) -> Result<PredictionOutcome, NormalizationError> {
    Normalizer::default().normalize(raw)
}

fn required<'a>(raw: &'a RawModelOutput, name: &'static str) -> Result<&'a Value, NormalizationError> {
    match raw.get(name) {
        None | Some(Value::Null) => Err(NormalizationError::MissingField(name)),
        Some(value) => Ok(value),
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> NormalizationError {
    NormalizationError::InvalidField {
        name,
        reason: reason.to_string(),
    }
}

// Class labels arrive as JSON integers; integral floats (`4.0`) are tolerated.
#[allow(clippy::cast_possible_truncation)]
fn label(value: &Value) -> Result<i64, NormalizationError> {
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
        _ => Err(invalid("prediction", format!("expected an integer label, found {value}"))),
    }
}

// Only an object qualifies; derived struct deserializers also accept sequences
fn class_probabilities(value: &Value) -> Option<ClassProbabilities> {
    let object = value.as_object()?;
    serde_json::from_value(Value::Object(object.clone())).ok()
}
