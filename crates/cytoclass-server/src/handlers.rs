//! Endpoint handlers
//!
//! Each handler calls one [`PredictionService`] operation and renders the
//! result; failures are rendered here too, so handlers never reject.

use crate::rejection::{pipeline_error, read_error};
use cytoclass_core::PredictionService;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use warp::reply::Response;
use warp::Reply;

/// `POST /predict` body
///
/// `features` is kept untyped so the validator reports shape errors itself.
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub features: Value,
}

pub async fn predict(
    request: PredictRequest,
    service: Arc<PredictionService>,
) -> Result<Response, Infallible> {
    Ok(match service.predict(&request.features).await {
        Ok(outcome) => warp::reply::json(&outcome).into_response(),
        Err(e) => pipeline_error(&e),
    })
}

pub async fn feature_importance(service: Arc<PredictionService>) -> Result<Response, Infallible> {
    Ok(warp::reply::json(&service.feature_importance().await).into_response())
}

pub async fn history(service: Arc<PredictionService>) -> Result<Response, Infallible> {
    Ok(match service.history().await {
        Ok(records) => warp::reply::json(&records).into_response(),
        Err(e) => read_error("prediction history", &e),
    })
}

pub async fn metrics(service: Arc<PredictionService>) -> Result<Response, Infallible> {
    Ok(match service.metrics().await {
        Ok(summary) => warp::reply::json(&summary).into_response(),
        Err(e) => read_error("metrics", &e),
    })
}

pub async fn trends(service: Arc<PredictionService>) -> Result<Response, Infallible> {
    Ok(match service.trends().await {
        Ok(trends) => warp::reply::json(&trends).into_response(),
        Err(e) => read_error("prediction trends", &e),
    })
}

pub async fn overview(service: Arc<PredictionService>) -> Result<Response, Infallible> {
    Ok(match service.overview().await {
        Ok(overview) => warp::reply::json(&overview).into_response(),
        Err(e) => read_error("metrics overview", &e),
    })
}
