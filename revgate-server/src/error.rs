//! Dispatch errors and their HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use revgate_github::ErrorKind;
use serde::Serialize;
use thiserror::Error;

use crate::dispatch::DeliveryStage;

/// Why a delivery could not be processed
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    BadPayload(String),

    #[error(transparent)]
    GitHub(#[from] revgate_github::Error),

    #[error("Review engine failed: {0}")]
    Engine(#[source] revgate_core::Error),

    #[error("Publishing the review failed and was not retried; resubmit manually if needed: {0}")]
    Publish(#[source] revgate_github::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn github_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Auth | ErrorKind::TransientNetwork | ErrorKind::PermanentApi => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::InvalidSignature => StatusCode::FORBIDDEN,
            DispatchError::BadPayload(_) => StatusCode::BAD_REQUEST,
            DispatchError::GitHub(e) | DispatchError::Publish(e) => github_status(e.kind()),
            DispatchError::Engine(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for the response body and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::InvalidSignature => "invalid_signature",
            DispatchError::BadPayload(_) => "bad_payload",
            DispatchError::GitHub(e) => e.kind().as_str(),
            DispatchError::Engine(_) => "engine_failure",
            DispatchError::Publish(_) => "publish_failed",
            DispatchError::Internal(_) => "internal",
        }
    }
}

/// A delivery that ended in `Rejected` or `Failed`
#[derive(Debug)]
pub struct DispatchFailure {
    pub delivery_id: String,
    /// Last stage completed before the failure
    pub stage: DeliveryStage,
    /// `Rejected` or `Failed`
    pub outcome: DeliveryStage,
    pub error: DispatchError,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: DeliveryStage,
    error: &'a str,
    message: String,
    delivery_id: &'a str,
    stage: DeliveryStage,
}

impl IntoResponse for DispatchFailure {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ErrorBody {
            status: self.outcome,
            error: self.error.error_code(),
            message: self.error.to_string(),
            delivery_id: &self.delivery_id,
            stage: self.stage,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DispatchError::InvalidSignature.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            DispatchError::BadPayload("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::GitHub(revgate_github::Error::Validation("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::GitHub(revgate_github::Error::Auth("x".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DispatchError::GitHub(revgate_github::Error::Timeout { attempts: 2 }).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DispatchError::GitHub(revgate_github::Error::Config("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DispatchError::Engine(revgate_core::Error::Engine("x".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DispatchError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_publish_failure_tells_caller_to_resubmit() {
        let err = DispatchError::Publish(revgate_github::Error::Transient {
            attempts: 1,
            status: Some(502),
            message: "HTTP 502".into(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.error_code(), "publish_failed");
        assert!(err.to_string().contains("resubmit manually"));
    }
}
