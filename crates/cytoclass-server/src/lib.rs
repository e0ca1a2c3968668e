//! Cytoclass Server - HTTP surface over the prediction pipeline
//!
//! - [`routes::routes`] builds the complete warp filter
//! - [`rejection`] maps pipeline errors and warp rejections to JSON bodies
//! - [`telemetry`] installs the tracing subscriber
//!
//! # Example
//!
//! ```rust,ignore
//! let service = Arc::new(PredictionService::new(&config, invoker, store));
//! warp::serve(cytoclass_server::routes::routes(service))
//!     .run(([0, 0, 0, 0], config.port))
//!     .await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod handlers;
pub mod rejection;
pub mod routes;
pub mod telemetry;

pub use rejection::ErrorBody;
pub use routes::{routes, MAX_BODY_BYTES};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
