//! Route table
//!
//! | method | path | handler |
//! |---|---|---|
//! | POST | `/predict` | [`handlers::predict`] |
//! | GET | `/feature-importance` | [`handlers::feature_importance`] |
//! | GET | `/api/predictions/history` | [`handlers::history`] |
//! | GET | `/api/metrics` | [`handlers::metrics`] |
//! | GET | `/api/metrics/trends` | [`handlers::trends`] |
//! | GET | `/api/metrics/overview` | [`handlers::overview`] |

use crate::handlers;
use crate::rejection::handle_rejection;
use cytoclass_core::PredictionService;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, Reply};

/// Largest accepted request body
pub const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Complete filter: routes, CORS, rejection handling and request tracing
pub fn routes(
    service: Arc<PredictionService>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["content-type"]);

    // Recover inside the CORS wrapper so error bodies carry the headers too;
    // the outer recover renders preflight refusals
    api(service)
        .recover(handle_rejection)
        .with(cors)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn api(
    service: Arc<PredictionService>,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    // Path before method, so an unknown path is a 404 rather than a 405
    let predict = warp::path!("predict")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(handlers::predict);

    let feature_importance = warp::path!("feature-importance")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::feature_importance);

    let history = warp::path!("api" / "predictions" / "history")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::history);

    let metrics = warp::path!("api" / "metrics")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::metrics);

    let trends = warp::path!("api" / "metrics" / "trends")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(handlers::trends);

    let overview = warp::path!("api" / "metrics" / "overview")
        .and(warp::get())
        .and(with_service(service))
        .and_then(handlers::overview);

    predict
        .or(feature_importance)
        .or(history)
        .or(metrics)
        .or(trends)
        .or(overview)
}

fn with_service(
    service: Arc<PredictionService>,
) -> impl Filter<Extract = (Arc<PredictionService>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&service))
}
