//! Table definitions, created on open if absent.

use rusqlite::Connection;

use crate::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS predictions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    features    TEXT    NOT NULL,
    prediction  INTEGER NOT NULL,
    tumor_type  TEXT    NOT NULL CHECK (tumor_type IN ('benigno', 'maligno')),
    probability REAL    NOT NULL,
    created_at  TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_predictions_created_at ON predictions (created_at);

CREATE TABLE IF NOT EXISTS feature_importances (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    feature    TEXT NOT NULL UNIQUE,
    importance REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS model_metrics (
    id                INTEGER PRIMARY KEY CHECK (id = 1),
    accuracy          REAL    NOT NULL,
    precision_score   REAL    NOT NULL,
    recall_score      REAL    NOT NULL,
    f1_score          REAL    NOT NULL,
    total_predictions INTEGER NOT NULL,
    updated_at        TEXT    NOT NULL
);
";

/// Create every table and index.
pub(crate) fn initialize(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
