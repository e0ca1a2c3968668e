//! Synchronous statements over a borrowed connection.
//!
//! Timestamps are stored as RFC 3339 text with microseconds and a `Z`
//! suffix, so lexical order equals chronological order.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use cytoclass_core::{
    FeatureImportance, FeatureVector, ModelMetrics, NewPrediction, PredictionCounts,
    PredictionRecord, TumorType,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::StoreError;

pub(crate) fn insert_prediction(
    conn: &Connection,
    new: &NewPrediction,
) -> Result<PredictionRecord, StoreError> {
    let created_at = new.created_at.trunc_subsecs(6);
    conn.execute(
        "INSERT INTO predictions (features, prediction, tumor_type, probability, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            serde_json::to_string(&new.features)?,
            new.outcome.prediction,
            new.outcome.tumor_type.as_str(),
            new.outcome.probability,
            timestamp(&created_at),
        ],
    )?;
    Ok(PredictionRecord {
        id: conn.last_insert_rowid(),
        features: new.features,
        prediction: new.outcome.prediction,
        tumor_type: new.outcome.tumor_type,
        probability: new.outcome.probability,
        created_at,
    })
}

pub(crate) fn recent_predictions(
    conn: &Connection,
    limit: usize,
) -> Result<Vec<PredictionRecord>, StoreError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare_cached(
        "SELECT id, features, prediction, tumor_type, probability, created_at
         FROM predictions
         ORDER BY created_at DESC, id DESC
         LIMIT ?1",
    )?;
    let records = stmt
        .query_map(params![limit], raw_prediction)?
        .map(|row| row.map_err(StoreError::from).and_then(RawPrediction::decode))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub(crate) fn prediction_counts(conn: &Connection) -> Result<PredictionCounts, StoreError> {
    let (total, benign, malign): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(tumor_type = 'benigno'), 0),
                COALESCE(SUM(tumor_type = 'maligno'), 0)
         FROM predictions",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(PredictionCounts {
        total: count(total)?,
        benign: count(benign)?,
        malign: count(malign)?,
    })
}

/// Recompute the metrics singleton from the counts it covers, atomically.
pub(crate) fn refresh_model_metrics(conn: &mut Connection) -> Result<ModelMetrics, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let metrics = ModelMetrics::recompute(&prediction_counts(&tx)?);
    tx.execute(
        "INSERT INTO model_metrics
             (id, accuracy, precision_score, recall_score, f1_score, total_predictions, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
             accuracy = excluded.accuracy,
             precision_score = excluded.precision_score,
             recall_score = excluded.recall_score,
             f1_score = excluded.f1_score,
             total_predictions = excluded.total_predictions,
             updated_at = excluded.updated_at",
        params![
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1_score,
            i64::try_from(metrics.total_predictions).unwrap_or(i64::MAX),
            timestamp(&metrics.updated_at),
        ],
    )?;
    tx.commit()?;
    Ok(metrics)
}

pub(crate) fn model_metrics(conn: &Connection) -> Result<Option<ModelMetrics>, StoreError> {
    let row = conn
        .query_row(
            "SELECT accuracy, precision_score, recall_score, f1_score, total_predictions, updated_at
             FROM model_metrics WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    row.map(|(accuracy, precision, recall, f1_score, total, updated_at)| {
        Ok(ModelMetrics {
            accuracy,
            precision,
            recall,
            f1_score,
            total_predictions: count(total)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    })
    .transpose()
}

pub(crate) fn feature_importances(conn: &Connection) -> Result<Vec<FeatureImportance>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT feature, importance FROM feature_importances
         ORDER BY importance DESC, feature ASC",
    )?;
    let importances = stmt
        .query_map([], |row| {
            Ok(FeatureImportance::new(
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(importances)
}

/// Insert `defaults` into an empty table; a populated table is left alone.
///
/// Returns the number of rows inserted.
pub(crate) fn seed_feature_importances(
    conn: &mut Connection,
    defaults: &[FeatureImportance],
) -> Result<usize, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing: i64 =
        tx.query_row("SELECT COUNT(*) FROM feature_importances", [], |row| row.get(0))?;
    let mut inserted = 0;
    if existing == 0 {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO feature_importances (feature, importance) VALUES (?1, ?2)",
        )?;
        for fi in defaults {
            inserted += stmt.execute(params![fi.feature, fi.importance])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

struct RawPrediction {
    id: i64,
    features: String,
    prediction: i64,
    tumor_type: String,
    probability: f64,
    created_at: String,
}

fn raw_prediction(row: &Row<'_>) -> rusqlite::Result<RawPrediction> {
    Ok(RawPrediction {
        id: row.get(0)?,
        features: row.get(1)?,
        prediction: row.get(2)?,
        tumor_type: row.get(3)?,
        probability: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl RawPrediction {
    fn decode(self) -> Result<PredictionRecord, StoreError> {
        let features: FeatureVector = serde_json::from_str(&self.features)?;
        let tumor_type = self
            .tumor_type
            .parse::<TumorType>()
            .map_err(|e| StoreError::Corrupt(format!("prediction {}: {e}", self.id)))?;
        Ok(PredictionRecord {
            id: self.id,
            features,
            prediction: self.prediction,
            tumor_type,
            probability: self.probability,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {text:?}: {e}")))
}

fn count(n: i64) -> Result<u64, StoreError> {
    u64::try_from(n).map_err(|_| StoreError::Corrupt(format!("negative count {n}")))
}
