//! Prediction service
//!
//! The single pipeline behind every endpoint:
//! - Validates the feature vector before anything external happens
//! - Runs the model through the injected invoker
//! - Normalizes and persists the outcome, then refreshes the metrics singleton
//! - Serves history, metrics and feature importance from the injected store

use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::invoker::ModelInvoker;
use crate::lifecycle::RequestLifecycle;
use crate::metrics::{
    prediction_trends, LatencyTracker, MetricsOverview, MetricsSummary, PredictionTrend,
};
use crate::normalizer::Normalizer;
use crate::store::PredictionStore;
use crate::types::{
    default_feature_importance, FeatureImportance, NewPrediction, PredictionOutcome,
    PredictionRecord, RequestId,
};
use crate::validator::FeatureValidator;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// The prediction pipeline
///
/// Owns no connections itself: the invoker and store are constructed once
/// at startup and shared by every request.
pub struct PredictionService {
    validator: FeatureValidator,
    normalizer: Normalizer,
    invoker: Arc<dyn ModelInvoker>,
    store: Arc<dyn PredictionStore>,
    latency: LatencyTracker,
    history_limit: usize,
}

impl PredictionService {
    /// Create service from configuration and collaborators
    #[must_use]
    pub fn new(
        config: &ServiceConfig,
        invoker: Arc<dyn ModelInvoker>,
        store: Arc<dyn PredictionStore>,
    ) -> Self {
        Self {
            validator: FeatureValidator::default(),
            normalizer: Normalizer::new(config.probability_policy),
            invoker,
            store,
            latency: LatencyTracker::default(),
            history_limit: config.history_limit,
        }
    }

    /// Run one prediction end to end
    ///
    /// # Workflow
    /// 1. Validate `features` (no process is spawned on failure)
    /// 2. Invoke the model
    /// 3. Normalize its output
    /// 4. Persist the record and refresh the metrics singleton
    ///
    /// # Errors
    /// The first failing stage's error, wrapped in [`PipelineError`].
    pub async fn predict(&self, features: &Value) -> Result<PredictionOutcome, PipelineError> {
        let mut lifecycle = RequestLifecycle::start(RequestId::new());
        let request_id = lifecycle.id();

        let span = tracing::info_span!("predict", %request_id);
        match self
            .run_pipeline(features, &mut lifecycle)
            .instrument(span)
            .await
        {
            Ok(outcome) => {
                lifecycle.advance();
                tracing::info!(
                    %request_id,
                    tumor_type = %outcome.tumor_type,
                    probability = outcome.probability,
                    "prediction completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                lifecycle.fail(e.kind());
                if e.is_client_error() {
                    tracing::info!(%request_id, error = %e, "prediction rejected");
                } else {
                    tracing::error!(%request_id, kind = %e.kind(), error = %e, "prediction failed");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        features: &Value,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<PredictionOutcome, PipelineError> {
        let vector = self.validator.validate(features)?;
        lifecycle.advance();

        let started = Instant::now();
        let raw = self.invoker.invoke(&vector).await;
        self.latency.record(started.elapsed());
        let raw = raw?;
        lifecycle.advance();

        let outcome = self.normalizer.normalize(&raw)?;
        lifecycle.advance();

        let record = self
            .store
            .insert_prediction(NewPrediction::now(vector, outcome.clone()))
            .await?;
        let metrics = self.store.refresh_model_metrics().await?;
        lifecycle.advance();
        tracing::debug!(
            request_id = %lifecycle.id(),
            record_id = record.id,
            total_predictions = metrics.total_predictions,
            "prediction persisted"
        );

        Ok(outcome)
    }

    /// Feature importances, seeding the defaults into an empty store
    ///
    /// Store failures are logged and answered with the defaults.
    pub async fn feature_importance(&self) -> Vec<FeatureImportance> {
        match self.load_or_seed_importance().await {
            Ok(importances) => importances,
            Err(e) => {
                tracing::warn!(error = %e, "feature importance unavailable, serving defaults");
                default_feature_importance()
            }
        }
    }

    async fn load_or_seed_importance(&self) -> Result<Vec<FeatureImportance>, PipelineError> {
        let stored = self.store.feature_importances().await?;
        if !stored.is_empty() {
            return Ok(stored);
        }
        tracing::info!("seeding default feature importances");
        Ok(self
            .store
            .seed_feature_importances(&default_feature_importance())
            .await?)
    }

    /// Most recent predictions, newest first
    ///
    /// # Errors
    /// `PipelineError::Persistence` when the store read fails.
    pub async fn history(&self) -> Result<Vec<PredictionRecord>, PipelineError> {
        let records = self.store.recent_predictions(self.history_limit).await?;
        tracing::debug!(count = records.len(), "loaded prediction history");
        Ok(records)
    }

    /// Aggregated counts and the metrics singleton
    ///
    /// # Errors
    /// `PipelineError::Persistence` when a store read fails.
    pub async fn metrics(&self) -> Result<MetricsSummary, PipelineError> {
        let counts = self.store.prediction_counts().await?;
        let stored = self.store.model_metrics().await?;
        tracing::debug!(
            total = counts.total,
            benign = counts.benign,
            malign = counts.malign,
            "computed metrics"
        );
        Ok(MetricsSummary::new(
            counts,
            stored.as_ref(),
            self.latency.mean_secs(),
        ))
    }

    /// Monthly trends over the history page
    ///
    /// # Errors
    /// `PipelineError::Persistence` when the store read fails.
    pub async fn trends(&self) -> Result<Vec<PredictionTrend>, PipelineError> {
        Ok(prediction_trends(&self.history().await?))
    }

    /// Metrics singleton, trends and importances in one view
    ///
    /// # Errors
    /// `PipelineError::Persistence` when a store read fails.
    pub async fn overview(&self) -> Result<MetricsOverview, PipelineError> {
        let metrics = self.store.model_metrics().await?;
        let prediction_trends = self.trends().await?;
        let feature_importance = self.feature_importance().await;
        Ok(MetricsOverview {
            metrics,
            prediction_trends,
            feature_importance,
        })
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("validator", &self.validator)
            .field("normalizer", &self.normalizer)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, InvocationError, PersistenceError, ValidationError};
    use crate::invoker::{MockModelInvoker, RawModelOutput};
    use crate::metrics::{ModelMetrics, PredictionCounts};
    use crate::store::MockPredictionStore;
    use crate::types::TumorType;
    use serde_json::json;

    fn raw_output() -> RawModelOutput {
        RawModelOutput::parse(r#"{"prediction":4,"tumor_type":"maligno","probability":0.92}"#)
            .unwrap()
    }

    fn stored(new: NewPrediction) -> PredictionRecord {
        PredictionRecord {
            id: 1,
            features: new.features,
            prediction: new.outcome.prediction,
            tumor_type: new.outcome.tumor_type,
            probability: new.outcome.probability,
            created_at: new.created_at,
        }
    }

    fn service(invoker: MockModelInvoker, store: MockPredictionStore) -> PredictionService {
        PredictionService::new(&ServiceConfig::default(), Arc::new(invoker), Arc::new(store))
    }

    #[tokio::test]
    async fn predict_runs_every_stage() {
        let mut invoker = MockModelInvoker::new();
        invoker
            .expect_invoke()
            .times(1)
            .withf(|v| v.to_arg() == "5,1,1,1,2,1,3,1,1")
            .returning(|_| Ok(raw_output()));

        let mut store = MockPredictionStore::new();
        store
            .expect_insert_prediction()
            .times(1)
            .returning(|new| Ok(stored(new)));
        store.expect_refresh_model_metrics().times(1).returning(|| {
            Ok(ModelMetrics::recompute(&PredictionCounts {
                total: 1,
                benign: 0,
                malign: 1,
            }))
        });

        let svc = service(invoker, store);
        let outcome = svc.predict(&json!([5, 1, 1, 1, 2, 1, 3, 1, 1])).await.unwrap();
        assert_eq!(outcome.tumor_type, TumorType::Malignant);
        assert_eq!(outcome.prediction, 4);
        assert_eq!(outcome.probability, 0.92);
        assert_eq!(svc.latency.samples(), 1);
    }

    #[tokio::test]
    async fn validation_failure_spawns_nothing() {
        let mut invoker = MockModelInvoker::new();
        invoker.expect_invoke().times(0);
        let mut store = MockPredictionStore::new();
        store.expect_insert_prediction().times(0);

        let svc = service(invoker, store);
        let err = svc.predict(&json!([1, 2, 3])).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::WrongLength { actual: 3, .. })
        ));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn invocation_failure_skips_persistence() {
        let mut invoker = MockModelInvoker::new();
        invoker.expect_invoke().returning(|_| {
            Err(InvocationError::ModelProcessFailed {
                exit_code: Some(1),
                stderr: "boom".into(),
            })
        });
        let mut store = MockPredictionStore::new();
        store.expect_insert_prediction().times(0);
        store.expect_refresh_model_metrics().times(0);

        let svc = service(invoker, store);
        let err = svc.predict(&json!([1, 1, 1, 1, 1, 1, 1, 1, 1])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invocation);
        assert_eq!(err.details(), "boom");
    }

    #[tokio::test]
    async fn persistence_failure_propagates_on_write() {
        let mut invoker = MockModelInvoker::new();
        invoker.expect_invoke().returning(|_| Ok(raw_output()));
        let mut store = MockPredictionStore::new();
        store
            .expect_insert_prediction()
            .returning(|_| Err(PersistenceError::Unavailable("disk full".into())));
        store.expect_refresh_model_metrics().times(0);

        let svc = service(invoker, store);
        let err = svc.predict(&json!([1, 1, 1, 1, 1, 1, 1, 1, 1])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn importance_seeds_empty_store() {
        let mut store = MockPredictionStore::new();
        store
            .expect_feature_importances()
            .times(1)
            .returning(|| Ok(Vec::new()));
        store
            .expect_seed_feature_importances()
            .times(1)
            .returning(|defaults| Ok(defaults.to_vec()));

        let svc = service(MockModelInvoker::new(), store);
        let importances = svc.feature_importance().await;
        assert_eq!(importances, default_feature_importance());
    }

    #[tokio::test]
    async fn importance_read_failure_serves_defaults() {
        let mut store = MockPredictionStore::new();
        store
            .expect_feature_importances()
            .returning(|| Err(PersistenceError::Unavailable("gone".into())));
        store.expect_seed_feature_importances().times(0);

        let svc = service(MockModelInvoker::new(), store);
        assert_eq!(svc.feature_importance().await, default_feature_importance());
    }

    #[tokio::test]
    async fn importance_existing_rows_not_reseeded() {
        let mut store = MockPredictionStore::new();
        store
            .expect_feature_importances()
            .returning(|| Ok(vec![FeatureImportance::new("Mitoses", 0.9)]));
        store.expect_seed_feature_importances().times(0);

        let svc = service(MockModelInvoker::new(), store);
        assert_eq!(
            svc.feature_importance().await,
            vec![FeatureImportance::new("Mitoses", 0.9)]
        );
    }

    #[tokio::test]
    async fn metrics_combine_counts_and_singleton() {
        let mut store = MockPredictionStore::new();
        let counts = PredictionCounts {
            total: 5,
            benign: 3,
            malign: 2,
        };
        store.expect_prediction_counts().returning(move || Ok(counts));
        store
            .expect_model_metrics()
            .returning(move || Ok(Some(ModelMetrics::recompute(&counts))));

        let svc = service(MockModelInvoker::new(), store);
        let summary = svc.metrics().await.unwrap();
        assert_eq!(summary.metrics.total_predictions, 5);
        assert_eq!(summary.benign_count, 3);
        assert_eq!(summary.malign_count, 2);
        assert_eq!(summary.metrics.accuracy, 1.0);
        assert_eq!(summary.metrics.response_time, 0.0);
    }

    #[tokio::test]
    async fn history_uses_configured_limit() {
        let mut store = MockPredictionStore::new();
        store
            .expect_recent_predictions()
            .withf(|limit| *limit == 100)
            .returning(|_| Ok(Vec::new()));

        let svc = service(MockModelInvoker::new(), store);
        assert!(svc.history().await.unwrap().is_empty());
    }
}
