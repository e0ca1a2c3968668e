//! Metrics arithmetic
//!
//! Everything here is pure over counts and records; the store decides when
//! to recompute and where to keep the singleton [`ModelMetrics`] row.

use crate::types::{FeatureImportance, PredictionRecord, TumorType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Reference precision reported until real labelled evaluation exists
pub const REFERENCE_PRECISION: f64 = 0.95;
/// Reference recall
pub const REFERENCE_RECALL: f64 = 0.94;
/// Reference F1 score
pub const REFERENCE_F1: f64 = 0.945;

/// Prediction totals by tumor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictionCounts {
    pub total: u64,
    pub benign: u64,
    pub malign: u64,
}

impl PredictionCounts {
    /// Tally a slice of records
    #[must_use]
    pub fn from_records(records: &[PredictionRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            match r.tumor_type {
                TumorType::Benign => acc.benign += 1,
                TumorType::Malignant => acc.malign += 1,
            }
            acc
        })
    }
}

/// Singleton model quality record, upserted after every prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub total_predictions: u64,
    pub updated_at: DateTime<Utc>,
}

impl ModelMetrics {
    /// Recompute from prediction totals
    ///
    /// Accuracy is the share of predictions that carry a known label;
    /// precision, recall and F1 are the reference constants.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn recompute(counts: &PredictionCounts) -> Self {
        let accuracy = if counts.total > 0 {
            (counts.benign + counts.malign) as f64 / counts.total as f64
        } else {
            0.0
        };
        Self {
            accuracy,
            precision: REFERENCE_PRECISION,
            recall: REFERENCE_RECALL,
            f1_score: REFERENCE_F1,
            total_predictions: counts.total,
            updated_at: Utc::now(),
        }
    }
}

/// Inner `metrics` object of `GET /api/metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub accuracy: f64,
    pub total_predictions: u64,
    pub benign_count: u64,
    pub malign_count: u64,
    /// Mean model invocation latency, seconds
    pub response_time: f64,
}

/// `GET /api/metrics` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub metrics: MetricsSnapshot,
    pub benign_count: u64,
    pub malign_count: u64,
}

impl MetricsSummary {
    /// Assemble from counts, the stored record and observed latency
    #[must_use]
    pub fn new(counts: PredictionCounts, stored: Option<&ModelMetrics>, response_time: f64) -> Self {
        Self {
            metrics: MetricsSnapshot {
                accuracy: stored.map_or(0.0, |m| m.accuracy),
                total_predictions: counts.total,
                benign_count: counts.benign,
                malign_count: counts.malign,
                response_time,
            },
            benign_count: counts.benign,
            malign_count: counts.malign,
        }
    }
}

/// Monthly prediction tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionTrend {
    /// `YYYY-MM`
    pub date: String,
    pub benigno: u64,
    pub maligno: u64,
}

/// Group records by creation month, oldest month first
#[must_use]
pub fn prediction_trends(records: &[PredictionRecord]) -> Vec<PredictionTrend> {
    let mut months: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for record in records {
        let entry = months
            .entry(record.created_at.format("%Y-%m").to_string())
            .or_default();
        match record.tumor_type {
            TumorType::Benign => entry.0 += 1,
            TumorType::Malignant => entry.1 += 1,
        }
    }
    months
        .into_iter()
        .map(|(date, (benigno, maligno))| PredictionTrend {
            date,
            benigno,
            maligno,
        })
        .collect()
}

/// `GET /api/metrics/overview` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsOverview {
    pub metrics: Option<ModelMetrics>,
    pub prediction_trends: Vec<PredictionTrend>,
    pub feature_importance: Vec<FeatureImportance>,
}

/// Running mean of model invocation latency
#[derive(Debug, Default)]
pub struct LatencyTracker {
    inner: Mutex<LatencyTotals>,
}

#[derive(Debug, Default, Clone, Copy)]
struct LatencyTotals {
    samples: u64,
    total: Duration,
}

impl LatencyTracker {
    /// Record one invocation
    pub fn record(&self, elapsed: Duration) {
        let mut guard = self.inner.lock();
        guard.samples += 1;
        guard.total += elapsed;
    }

    /// Number of recorded invocations
    #[must_use]
    pub fn samples(&self) -> u64 {
        self.inner.lock().samples
    }

    /// Mean latency in seconds, 0 before the first sample
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_secs(&self) -> f64 {
        let totals = *self.inner.lock();
        if totals.samples == 0 {
            0.0
        } else {
            totals.total.as_secs_f64() / totals.samples as f64
        }
    }
}
