//! Store-local errors

use cytoclass_core::PersistenceError;

/// Errors raised inside the SQLite store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// SQLite rejected a statement or the connection
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON column failed to encode or decode
    #[error("json column: {0}")]
    Json(#[from] serde_json::Error),

    /// Database directory could not be prepared
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Row holds a value outside the domain
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Blocking worker died before answering
    #[error("store worker failed: {0}")]
    Worker(String),
}

impl From<StoreError> for PersistenceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Sqlite(e) => match e {
                rusqlite::Error::SqliteFailure(ref code, _)
                    if matches!(
                        code.code,
                        rusqlite::ErrorCode::CannotOpen
                            | rusqlite::ErrorCode::DatabaseBusy
                            | rusqlite::ErrorCode::DatabaseLocked
                            | rusqlite::ErrorCode::DiskFull
                            | rusqlite::ErrorCode::ReadOnly
                    ) =>
                {
                    Self::Unavailable(e.to_string())
                }
                other => Self::Query(other.to_string()),
            },
            StoreError::Io(e) => Self::Unavailable(e.to_string()),
            StoreError::Worker(reason) => Self::Unavailable(reason),
            StoreError::Json(e) => Self::Corrupt(e.to_string()),
            StoreError::Corrupt(reason) => Self::Corrupt(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_persistence_categories() {
        let busy = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ));
        assert!(matches!(
            PersistenceError::from(busy),
            PersistenceError::Unavailable(_)
        ));

        let missing = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(
            PersistenceError::from(missing),
            PersistenceError::Query(_)
        ));

        assert_eq!(
            PersistenceError::from(StoreError::Corrupt("tumor_type 'x'".into())),
            PersistenceError::Corrupt("tumor_type 'x'".into())
        );
    }
}
