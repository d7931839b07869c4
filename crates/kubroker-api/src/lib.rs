//! Open Service Broker v2 wire surface: request and response bodies, query
//! strings, the API version header and the error body.

mod osb;

pub use osb::*;

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use kubroker_engine::{BrokerError, ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code the broker sends when an operation can only complete asynchronously.
pub const ASYNC_REQUIRED: &str = "AsyncRequired";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Gone: {0}")]
    Gone(String),
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("Unprocessable entity: {description}")]
    UnprocessableEntity {
        code: &'static str,
        description: String,
    },
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// `{"error": ..., "description": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub description: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn gone(msg: impl Into<String>) -> Self {
        Self::Gone(msg.into())
    }
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }
    pub fn async_required() -> Self {
        Self::UnprocessableEntity {
            code: ASYNC_REQUIRED,
            description: "This service plan requires client support for asynchronous service operations."
                .to_string(),
        }
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            ApiError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let (error, description) = match self {
            ApiError::BadRequest(msg) => ("BadRequest", msg),
            ApiError::Conflict(msg) => ("Conflict", msg),
            ApiError::Gone(msg) => ("Gone", msg),
            ApiError::PreconditionFailed(msg) => ("PreconditionFailed", msg),
            ApiError::UnprocessableEntity { code, description } => (*code, description),
            ApiError::Internal(msg) => ("InternalError", msg),
            ApiError::ServiceUnavailable(msg) => ("ServiceUnavailable", msg),
        };
        ErrorBody {
            error: Some(error.to_string()),
            description: description.clone(),
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::ValidationFailure => Self::BadRequest(msg),
            ErrorKind::Conflict => Self::Conflict(msg),
            ErrorKind::Gone => Self::Gone(msg),
            ErrorKind::ClusterFailure | ErrorKind::Internal => Self::Internal(msg),
            ErrorKind::PersistenceFailure => Self::ServiceUnavailable(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::to_vec(&self.to_body()).unwrap_or_else(|_| b"{}".to_vec());

        axum::http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(axum::body::Body::from(body))
            .unwrap_or_else(|_| {
                axum::http::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(axum::body::Body::empty())
                    .unwrap_or_default()
            })
    }
}
