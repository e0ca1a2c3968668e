//! Cytoclass Store - SQLite persistence
//!
//! Implements [`cytoclass_core::PredictionStore`] over a single SQLite
//! connection. Statements run on the blocking pool; one mutex serializes
//! them, so multi-statement operations (seeding, metrics refresh) are
//! atomic with respect to each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use cytoclass_store::SqliteStore;
//!
//! let store = SqliteStore::open("data/cytoclass.db")?;
//! let counts = store.prediction_counts().await?;
//! ```

#![warn(unreachable_pub)]

pub mod error;
mod pragmas;
mod queries;
mod schema;
mod sqlite;

pub use error::StoreError;
pub use sqlite::SqliteStore;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
