//! Core types for cytoclass
//!
//! Defines the fundamental types of the prediction pipeline:
//! - The fixed 9-attribute feature schema and validated feature vectors
//! - Tumor type labels and normalized prediction outcomes
//! - Persisted prediction records and feature importances

use chrono::{DateTime, Utc};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Number of attributes in a feature vector
pub const FEATURE_COUNT: usize = 9;

/// Attribute names, position i describes element i of a feature vector
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "Clump_Thickness",
    "Uniformity_of_Cell_Size",
    "Uniformity_of_Cell_Shape",
    "Marginal_Adhesion",
    "Single_Epithelial_Cell_Size",
    "Bare_Nuclei",
    "Bland_Chromatin",
    "Normal_Nucleoli",
    "Mitoses",
];

/// Unique request identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Ulid);

impl RequestId {
    /// Generate new request ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed value range shared by every attribute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSchema {
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
}

impl FeatureSchema {
    /// Attribute name at `index`
    #[inline]
    #[must_use]
    pub fn attribute(index: usize) -> &'static str {
        FEATURE_NAMES[index]
    }

    /// Check value against the closed range
    #[inline]
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self { min: 1.0, max: 10.0 }
    }
}

/// Validated, order-significant feature vector
///
/// Only the validator produces these from untrusted input; stored rows
/// deserialize straight into it. Serializes as a JSON array with integral
/// values written as integers, so `[5, 1, ...]` round-trips unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    #[inline]
    pub(crate) fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    /// Raw values in schema order
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Iterate `(attribute, value)` pairs
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied())
    }

    /// Comma-joined decimal form passed to the model process
    ///
    /// Integral values print without a fractional part (`5`, not `5.0`).
    #[must_use]
    pub fn to_arg(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Serialize for FeatureVector {
    #[allow(clippy::cast_possible_truncation)]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Largest magnitude where every integer is exact in an f64
        const EXACT: f64 = 9_007_199_254_740_992.0;

        let mut seq = serializer.serialize_seq(Some(FEATURE_COUNT))?;
        for value in &self.0 {
            if value.fract() == 0.0 && value.abs() < EXACT {
                seq.serialize_element(&(*value as i64))?;
            } else {
                seq.serialize_element(value)?;
            }
        }
        seq.end()
    }
}

/// Classification outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TumorType {
    /// Benign sample
    #[serde(rename = "benigno")]
    Benign,
    /// Malignant sample
    #[serde(rename = "maligno")]
    Malignant,
}

impl TumorType {
    /// Wire label
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TumorType::Benign => "benigno",
            TumorType::Malignant => "maligno",
        }
    }
}

impl fmt::Display for TumorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown tumor type label
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tumor type: {0:?}")]
pub struct UnknownTumorType(pub String);

impl FromStr for TumorType {
    type Err = UnknownTumorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "benigno" => Ok(TumorType::Benign),
            "maligno" => Ok(TumorType::Malignant),
            other => Err(UnknownTumorType(other.to_string())),
        }
    }
}

/// Per-class probabilities reported by the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub benigno: f64,
    pub maligno: f64,
}

/// Normalized model result, returned by `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    /// Model class label
    pub prediction: i64,
    /// Outcome category
    #[serde(rename = "tumor_type")]
    pub tumor_type: TumorType,
    /// Confidence of the predicted class
    pub probability: f64,
    /// Per-class breakdown, when the model reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<ClassProbabilities>,
}

/// Prediction about to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub features: FeatureVector,
    pub outcome: PredictionOutcome,
    pub created_at: DateTime<Utc>,
}

impl NewPrediction {
    /// Stamp an outcome with the current time
    #[inline]
    #[must_use]
    pub fn now(features: FeatureVector, outcome: PredictionOutcome) -> Self {
        Self {
            features,
            outcome,
            created_at: Utc::now(),
        }
    }
}

/// Persisted prediction (immutable once written)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    pub id: i64,
    pub features: FeatureVector,
    pub prediction: i64,
    pub tumor_type: TumorType,
    pub probability: f64,
    pub created_at: DateTime<Utc>,
}

/// Static per-attribute importance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

impl FeatureImportance {
    /// Create new importance entry
    #[inline]
    pub fn new(feature: impl Into<String>, importance: f64) -> Self {
        Self {
            feature: feature.into(),
            importance,
        }
    }
}

/// Importances seeded into an empty store, highest first
pub const DEFAULT_FEATURE_IMPORTANCE: [(&str, f64); FEATURE_COUNT] = [
    ("Uniformity_of_Cell_Size", 0.85),
    ("Uniformity_of_Cell_Shape", 0.82),
    ("Bare_Nuclei", 0.78),
    ("Bland_Chromatin", 0.75),
    ("Clump_Thickness", 0.72),
    ("Normal_Nucleoli", 0.68),
    ("Marginal_Adhesion", 0.65),
    ("Single_Epithelial_Cell_Size", 0.62),
    ("Mitoses", 0.58),
];

/// Owned copy of the default importances
#[must_use]
pub fn default_feature_importance() -> Vec<FeatureImportance> {
    DEFAULT_FEATURE_IMPORTANCE
        .iter()
        .map(|(feature, importance)| FeatureImportance::new(*feature, *importance))
        .collect()
}
