//! SqliteStore - owns the connection and implements `PredictionStore`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cytoclass_core::{
    FeatureImportance, ModelMetrics, NewPrediction, PersistenceError, PredictionCounts,
    PredictionRecord, PredictionStore,
};
use parking_lot::Mutex;
use rusqlite::Connection;

use crate::{pragmas, queries, schema, StoreError};

/// SQLite-backed prediction store
///
/// Cloning shares the underlying connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file, creating its directory if needed.
    ///
    /// # Errors
    /// `StoreError` when the directory or database cannot be prepared.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        pragmas::apply_pragmas(&conn)?;
        let store = Self::initialize(conn)?;
        tracing::info!(path = %path.display(), "prediction store opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    /// `StoreError` when the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))
        .and_then(|inner| inner);

        result.map_err(|e| {
            tracing::warn!(error = %e, "store operation failed");
            PersistenceError::from(e)
        })
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl PredictionStore for SqliteStore {
    async fn insert_prediction(
        &self,
        prediction: NewPrediction,
    ) -> Result<PredictionRecord, PersistenceError> {
        self.with_conn(move |conn| queries::insert_prediction(conn, &prediction))
            .await
    }

    async fn recent_predictions(
        &self,
        limit: usize,
    ) -> Result<Vec<PredictionRecord>, PersistenceError> {
        self.with_conn(move |conn| queries::recent_predictions(conn, limit))
            .await
    }

    async fn prediction_counts(&self) -> Result<PredictionCounts, PersistenceError> {
        self.with_conn(|conn| queries::prediction_counts(conn)).await
    }

    async fn refresh_model_metrics(&self) -> Result<ModelMetrics, PersistenceError> {
        self.with_conn(queries::refresh_model_metrics).await
    }

    async fn model_metrics(&self) -> Result<Option<ModelMetrics>, PersistenceError> {
        self.with_conn(|conn| queries::model_metrics(conn)).await
    }

    async fn feature_importances(&self) -> Result<Vec<FeatureImportance>, PersistenceError> {
        self.with_conn(|conn| queries::feature_importances(conn)).await
    }

    async fn seed_feature_importances(
        &self,
        defaults: &[FeatureImportance],
    ) -> Result<Vec<FeatureImportance>, PersistenceError> {
        let defaults = defaults.to_vec();
        self.with_conn(move |conn| {
            let inserted = queries::seed_feature_importances(conn, &defaults)?;
            if inserted > 0 {
                tracing::info!(inserted, "seeded feature importances");
            }
            queries::feature_importances(conn)
        })
        .await
    }
}
