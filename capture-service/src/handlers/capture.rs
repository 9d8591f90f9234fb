//! Capture and reconciliation endpoints.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use service_core::middleware::tracing::RequestId;

use crate::{
    dtos::{CaptureRequest, CaptureResponse, CAPTURED_MESSAGE, RECONCILED_MESSAGE},
    error::CaptureError,
    startup::AppState,
};

/// `POST /capture-payment`
///
/// Captures the authorized payment, marks it held in escrow and moves the
/// booking to `in_progress`.
pub async fn capture_payment(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    payload: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<Json<CaptureResponse>, CaptureError> {
    let request = parse_body(payload)?;
    let request_id = request_id.map(|Extension(id)| id.0).unwrap_or_default();

    match state.orchestrator.capture_detached(request.clone()).await {
        Ok(outcome) => {
            tracing::info!(
                request_id = %request_id,
                payment_intent_id = %outcome.payment_intent_id,
                booking_id = %outcome.booking_id,
                paid_at = %outcome.paid_at,
                "Capture request completed"
            );
            Ok(Json(CaptureResponse::ok(CAPTURED_MESSAGE)))
        }
        Err(err) => {
            log_failure(&request_id, &request, &err, "Capture request failed");
            Err(err)
        }
    }
}

/// `POST /reconcile-capture`
///
/// Repairs local records after a `persistence_failed` capture. Safe to repeat:
/// it never captures funds.
pub async fn reconcile_capture(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    payload: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<Json<CaptureResponse>, CaptureError> {
    let request = parse_body(payload)?;
    let request_id = request_id.map(|Extension(id)| id.0).unwrap_or_default();

    match state.orchestrator.reconcile_detached(request.clone()).await {
        Ok(outcome) => {
            tracing::info!(
                request_id = %request_id,
                payment_intent_id = %outcome.payment_intent_id,
                booking_id = %outcome.booking_id,
                "Reconcile request completed"
            );
            Ok(Json(CaptureResponse::ok(RECONCILED_MESSAGE)))
        }
        Err(err) => {
            log_failure(&request_id, &request, &err, "Reconcile request failed");
            Err(err)
        }
    }
}

fn parse_body(
    payload: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<CaptureRequest, CaptureError> {
    payload.map(|Json(request)| request).map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "Malformed capture request body");
        CaptureError::InvalidRequest(rejection.body_text())
    })
}

fn log_failure(request_id: &str, request: &CaptureRequest, err: &CaptureError, message: &str) {
    let payment_intent_id = request.payment_intent_id.as_deref().unwrap_or("-");
    let booking_id = request.booking_id.as_deref().unwrap_or("-");

    match err {
        CaptureError::PersistenceFailed { .. } | CaptureError::Interrupted { .. } => {
            tracing::error!(
                request_id = %request_id,
                payment_intent_id = %payment_intent_id,
                booking_id = %booking_id,
                code = err.code(),
                error = %err,
                "{}", message
            )
        }
        _ => tracing::warn!(
            request_id = %request_id,
            payment_intent_id = %payment_intent_id,
            booking_id = %booking_id,
            code = err.code(),
            retryable = err.is_retryable(),
            error = %err,
            "{}", message
        ),
    }
}
