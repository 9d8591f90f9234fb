//! Capture failure taxonomy and its HTTP mapping.
//!
//! | Variant | HTTP | `code` | `retryable` |
//! |---------|------|--------|-------------|
//! | `InvalidRequest` | 400 | `invalid_request` | false |
//! | `CaptureFailed` | 502 | `capture_failed` | true |
//! | `PersistenceFailed` | 500 | `persistence_failed` | false |
//! | `NotCaptured` | 409 | `not_captured` | false |
//! | `Interrupted` | 500 | `interrupted` | false |

use crate::services::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which store write failed after funds were captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStage {
    Payment,
    Booking,
}

impl fmt::Display for PersistenceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceStage::Payment => f.write_str("payment"),
            PersistenceStage::Booking => f.write_str("booking"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    /// A required input is missing. Nothing was attempted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The processor did not capture. The store was not touched.
    #[error("payment capture failed: {reason}")]
    CaptureFailed { reason: String },

    /// Funds are captured at the processor but local state is behind.
    #[error("payment captured but {stage} record update failed: {source}")]
    PersistenceFailed {
        stage: PersistenceStage,
        #[source]
        source: StoreError,
    },

    /// Reconciliation found the intent not captured at the processor.
    #[error("payment intent is not captured (processor status: {status})")]
    NotCaptured { status: String },

    /// The operation task ended without a result. Funds may be captured.
    #[error("{operation} did not complete: {reason}")]
    Interrupted {
        operation: &'static str,
        reason: String,
    },
}

impl CaptureError {
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::InvalidRequest(_) => "invalid_request",
            CaptureError::CaptureFailed { .. } => "capture_failed",
            CaptureError::PersistenceFailed { .. } => "persistence_failed",
            CaptureError::NotCaptured { .. } => "not_captured",
            CaptureError::Interrupted { .. } => "interrupted",
        }
    }

    /// Whether the caller may safely resend the same request.
    ///
    /// Only `CaptureFailed` qualifies: nothing changed anywhere. After a
    /// `PersistenceFailed` a resend would capture again, so recovery goes
    /// through reconciliation instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CaptureError::CaptureFailed { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CaptureError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CaptureError::CaptureFailed { .. } => StatusCode::BAD_GATEWAY,
            CaptureError::PersistenceFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CaptureError::NotCaptured { .. } => StatusCode::CONFLICT,
            CaptureError::Interrupted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error envelope returned to callers.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<PersistenceStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<&'static str>,
}

impl From<&CaptureError> for ErrorBody {
    fn from(err: &CaptureError) -> Self {
        let stage = match err {
            CaptureError::PersistenceFailed { stage, .. } => Some(*stage),
            _ => None,
        };
        let recovery = match err {
            CaptureError::PersistenceFailed { .. } | CaptureError::Interrupted { .. } => {
                Some("reconcile")
            }
            _ => None,
        };

        Self {
            error: err.to_string(),
            code: err.code(),
            retryable: err.is_retryable(),
            stage,
            recovery,
        }
    }
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_failure_points_to_reconciliation() {
        let err = CaptureError::PersistenceFailed {
            stage: PersistenceStage::Booking,
            source: StoreError::NotFound {
                table: "bookings".into(),
                key: "id=bk_1".into(),
            },
        };
        let body = serde_json::to_value(ErrorBody::from(&err)).unwrap();

        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "persistence_failed");
        assert_eq!(body["retryable"], false);
        assert_eq!(body["stage"], "booking");
        assert_eq!(body["recovery"], "reconcile");
    }

    #[test]
    fn capture_failure_is_retryable_without_stage() {
        let err = CaptureError::CaptureFailed {
            reason: "card declined".into(),
        };
        let body = serde_json::to_value(ErrorBody::from(&err)).unwrap();

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(body["retryable"], true);
        assert!(body.get("stage").is_none());
        assert!(body["error"].as_str().unwrap().contains("card declined"));
    }

    #[test]
    fn interrupted_operation_points_to_reconciliation() {
        let err = CaptureError::Interrupted {
            operation: "capture",
            reason: "task panicked".into(),
        };
        let body = serde_json::to_value(ErrorBody::from(&err)).unwrap();

        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "interrupted");
        assert_eq!(body["retryable"], false);
        assert_eq!(body["recovery"], "reconcile");
        assert!(body.get("stage").is_none());
    }

    #[test]
    fn invalid_request_is_client_error() {
        let err = CaptureError::InvalidRequest("bookingId is required".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_retryable());
    }
}
