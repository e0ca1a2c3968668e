//! Cytoclass Core - breast tumor classification pipeline
//!
//! The request path behind every endpoint:
//! - Validates the nine cytology features
//! - Runs the external model process with a timeout
//! - Normalizes the model's JSON into a typed outcome
//! - Persists predictions and keeps the metrics singleton current
//!
//! # Example
//!
//! ```rust,ignore
//! use cytoclass_core::{PredictionService, ProcessInvoker, ServiceConfig};
//! use std::sync::Arc;
//!
//! # async fn example(store: Arc<dyn cytoclass_core::PredictionStore>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::from_env()?;
//! let invoker = Arc::new(ProcessInvoker::new(config.model.clone()));
//! let service = PredictionService::new(&config, invoker, store);
//!
//! let outcome = service.predict(&serde_json::json!([5, 1, 1, 1, 2, 1, 3, 1, 1])).await?;
//! println!("{} ({:.2})", outcome.tumor_type, outcome.probability);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod invoker;
pub mod lifecycle;
pub mod metrics;
pub mod normalizer;
pub mod service;
pub mod store;
pub mod types;
pub mod validator;

pub use config::{Environment, LogFormat, ModelConfig, ProbabilityPolicy, ServiceConfig};
pub use error::{
    ConfigError, ErrorKind, InvocationError, NormalizationError, PersistenceError, PipelineError,
    ValidationError,
};
pub use invoker::{ModelInvoker, ProcessInvoker, RawModelOutput};
pub use lifecycle::{RequestLifecycle, RequestState};
pub use metrics::{
    LatencyTracker, MetricsOverview, MetricsSnapshot, MetricsSummary, ModelMetrics,
    PredictionCounts, PredictionTrend,
};
pub use normalizer::Normalizer;
pub use service::PredictionService;
pub use store::PredictionStore;
pub use types::{
    default_feature_importance, ClassProbabilities, FeatureImportance, FeatureSchema,
    FeatureVector, NewPrediction, PredictionOutcome, PredictionRecord, RequestId, TumorType,
    FEATURE_COUNT, FEATURE_NAMES,
};
pub use validator::FeatureValidator;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Cytoclass Core
    pub use crate::{
        FeatureImportance, FeatureVector, ModelInvoker, PipelineError, PredictionOutcome,
        PredictionRecord, PredictionService, PredictionStore, ProcessInvoker, ServiceConfig,
        TumorType,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::invoker::MockModelInvoker;
    use crate::store::MockPredictionStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn out_of_range_features_never_reach_the_model() {
        let mut invoker = MockModelInvoker::new();
        invoker.expect_invoke().times(0);
        let service = PredictionService::new(
            &ServiceConfig::default(),
            Arc::new(invoker),
            Arc::new(MockPredictionStore::new()),
        );

        let err = service
            .predict(&serde_json::json!([0, 1, 1, 1, 1, 1, 1, 1, 1]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "feature Clump_Thickness (index 0) must be between 1 and 10"
        );
    }

    #[test]
    fn feature_names_match_default_importance() {
        let names: Vec<_> = default_feature_importance()
            .into_iter()
            .map(|fi| fi.feature)
            .collect();
        assert_eq!(names.len(), FEATURE_COUNT);
        for name in FEATURE_NAMES {
            assert!(names.iter().any(|n| n == name), "{name} missing");
        }
    }
}
