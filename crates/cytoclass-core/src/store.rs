//! Persistence gateway seam
//!
//! The service only sees this trait. The SQLite implementation lives in
//! `cytoclass-store`; unit tests use the generated mock.

use crate::error::PersistenceError;
use crate::metrics::{ModelMetrics, PredictionCounts};
use crate::types::{FeatureImportance, NewPrediction, PredictionRecord};
use async_trait::async_trait;

/// Store for predictions, feature importances and the metrics singleton
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Insert one prediction and return the stored record
    async fn insert_prediction(
        &self,
        prediction: NewPrediction,
    ) -> Result<PredictionRecord, PersistenceError>;

    /// Most recent predictions, newest first
    async fn recent_predictions(
        &self,
        limit: usize,
    ) -> Result<Vec<PredictionRecord>, PersistenceError>;

    /// Totals by tumor type
    async fn prediction_counts(&self) -> Result<PredictionCounts, PersistenceError>;

    /// Recompute the metrics singleton from the prediction history and upsert it
    async fn refresh_model_metrics(&self) -> Result<ModelMetrics, PersistenceError>;

    /// Current metrics singleton, if one was ever written
    async fn model_metrics(&self) -> Result<Option<ModelMetrics>, PersistenceError>;

    /// Stored importances, highest first
    async fn feature_importances(&self) -> Result<Vec<FeatureImportance>, PersistenceError>;

    /// Insert `defaults` only if no importances exist, then return the stored set
    ///
    /// Must be idempotent under concurrent callers.
    async fn seed_feature_importances(
        &self,
        defaults: &[FeatureImportance],
    ) -> Result<Vec<FeatureImportance>, PersistenceError>;
}
