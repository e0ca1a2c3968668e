//! Error responses
//!
//! Every failure leaves the server as `{error, details?, code?}` JSON.

use cytoclass_core::{ErrorKind, InvocationError, PipelineError};
use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

/// JSON error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Exit code of a failed model process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl ErrorBody {
    /// Body with a message only
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            code: None,
        }
    }

    /// With diagnostic detail
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Render with a status
    pub fn into_response(self, status: StatusCode) -> Response {
        warp::reply::with_status(warp::reply::json(&self), status).into_response()
    }
}

/// Map a pipeline failure from `POST /predict` to its response
pub fn pipeline_error(err: &PipelineError) -> Response {
    match err {
        PipelineError::Validation(e) => {
            ErrorBody::new(e.to_string()).into_response(StatusCode::BAD_REQUEST)
        }
        PipelineError::Invocation(InvocationError::ModelProcessFailed { exit_code, .. }) => {
            ErrorBody {
                error: "model process failed".to_string(),
                details: Some(err.details()),
                code: *exit_code,
            }
            .into_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
        other => {
            let message = match other.kind() {
                ErrorKind::Invocation => "model invocation failed",
                ErrorKind::Normalization => "model output could not be processed",
                ErrorKind::Persistence => "prediction could not be stored",
                ErrorKind::Validation => "invalid request",
            };
            ErrorBody::new(message)
                .with_details(other.details())
                .into_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Map a read-path failure to a 500 naming the resource
pub fn read_error(resource: &str, err: &PipelineError) -> Response {
    ErrorBody::new(format!("failed to load {resource}"))
        .with_details(err.details())
        .into_response(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Turn warp rejections into JSON errors
///
/// # Errors
/// Never; every rejection becomes a reply.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "content-length required".to_string())
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if let Some(e) = err.find::<warp::filters::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else {
        tracing::error!(rejection = ?err, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        )
    };

    Ok(ErrorBody::new(message).into_response(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cytoclass_core::{NormalizationError, PersistenceError, ValidationError};
    use serde_json::{json, Value};

    async fn body(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = warp::hyper::body::to_bytes(response.into_body())
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_is_bad_request_without_details() {
        let err = PipelineError::from(ValidationError::WrongLength {
            expected: 9,
            actual: 3,
        });
        let (status, json) = body(pipeline_error(&err)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json, json!({"error": "exactly 9 features are required, got 3"}));
    }

    #[tokio::test]
    async fn process_failure_carries_stderr_and_code() {
        let err = PipelineError::from(InvocationError::ModelProcessFailed {
            exit_code: Some(2),
            stderr: "ImportError: sklearn".to_string(),
        });
        let (status, json) = body(pipeline_error(&err)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json,
            json!({
                "error": "model process failed",
                "details": "ImportError: sklearn",
                "code": 2
            })
        );
    }

    #[tokio::test]
    async fn other_failures_are_server_errors_with_details() {
        let err = PipelineError::from(NormalizationError::MissingField("probability"));
        let (status, json) = body(pipeline_error(&err)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "model output could not be processed");
        assert!(json["details"].as_str().unwrap().contains("probability"));

        let err = PipelineError::from(PersistenceError::Unavailable("locked".into()));
        let (_, json) = body(read_error("metrics", &err)).await;
        assert_eq!(json["error"], "failed to load metrics");
    }
}
