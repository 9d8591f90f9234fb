//! Escrow capture orchestration.
//!
//! Moves a booking from `payment_authorized` to `in_progress`:
//!
//! 1. validate the request (no external call before this passes)
//! 2. capture funds at the processor
//! 3. mark the payment `completed` / `held`
//! 4. mark the booking `in_progress` / `payment_agreed`
//!
//! Each step only runs after the previous one succeeded. A failure after step
//! 2 leaves money captured with local state behind; that case is reported as
//! [`CaptureError::PersistenceFailed`] and repaired with [`CaptureOrchestrator::reconcile`],
//! which re-applies steps 3 and 4 after confirming the capture with the
//! processor instead of capturing again.

use crate::dtos::CaptureRequest;
use crate::error::{CaptureError, PersistenceStage};
use crate::models::{BookingStartedUpdate, PaymentHeldUpdate, PaymentRecord, PaymentStatus};
use crate::services::metrics::record_capture;
use crate::services::processor::{PaymentIntentStatus, PaymentProcessor};
use crate::services::store::PaymentStore;
use chrono::{DateTime, Utc};
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn, Instrument};
use validator::Validate;

/// Result of a successful capture or reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub payment_intent_id: String,
    pub booking_id: String,
    pub intent_status: PaymentIntentStatus,
    pub paid_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CaptureOrchestrator {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn PaymentStore>,
    store_retry: RetryConfig,
    guard_completed: bool,
}

impl CaptureOrchestrator {
    pub fn new(processor: Arc<dyn PaymentProcessor>, store: Arc<dyn PaymentStore>) -> Self {
        Self {
            processor,
            store,
            store_retry: RetryConfig::default(),
            guard_completed: false,
        }
    }

    /// Retry policy for the two store writes.
    pub fn with_store_retry(mut self, retry: RetryConfig) -> Self {
        self.store_retry = retry;
        self
    }

    /// Check the local payment row before capturing and refuse when it is
    /// missing or already completed.
    pub fn with_completed_guard(mut self, enabled: bool) -> Self {
        self.guard_completed = enabled;
        self
    }

    /// Capture an authorized payment and start its booking.
    #[instrument(
        skip(self, request),
        fields(payment_intent_id = tracing::field::Empty, booking_id = tracing::field::Empty)
    )]
    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, CaptureError> {
        let result = self.run_capture(request).await;
        record_capture("capture", outcome_label(&result));
        result
    }

    /// Bring local records in line with a capture the processor already holds.
    ///
    /// Never calls processor capture. Applies the payment and booking updates
    /// only when the processor reports the intent `succeeded`.
    #[instrument(
        skip(self, request),
        fields(payment_intent_id = tracing::field::Empty, booking_id = tracing::field::Empty)
    )]
    pub async fn reconcile(
        &self,
        request: &CaptureRequest,
    ) -> Result<CaptureOutcome, CaptureError> {
        let result = self.run_reconcile(request).await;
        record_capture("reconcile", outcome_label(&result));
        result
    }

    /// Run [`capture`](Self::capture) on its own task.
    ///
    /// Store writes after a capture finish even if the caller's future is
    /// dropped.
    pub async fn capture_detached(
        &self,
        request: CaptureRequest,
    ) -> Result<CaptureOutcome, CaptureError> {
        let orchestrator = self.clone();
        let task =
            tokio::spawn(async move { orchestrator.capture(&request).await }.in_current_span());
        joined("capture", task).await
    }

    /// Run [`reconcile`](Self::reconcile) on its own task.
    pub async fn reconcile_detached(
        &self,
        request: CaptureRequest,
    ) -> Result<CaptureOutcome, CaptureError> {
        let orchestrator = self.clone();
        let task =
            tokio::spawn(async move { orchestrator.reconcile(&request).await }.in_current_span());
        joined("reconcile", task).await
    }

    async fn run_capture(&self, request: &CaptureRequest) -> Result<CaptureOutcome, CaptureError> {
        let (payment_intent_id, booking_id) = validated(request)?;
        record_ids(payment_intent_id, booking_id);

        if self.guard_completed {
            self.ensure_capturable(payment_intent_id).await?;
        }

        let intent = self
            .processor
            .capture(payment_intent_id)
            .await
            .map_err(|e| {
                warn!(error = %e, transient = e.is_transient(), "Processor capture failed");
                CaptureError::CaptureFailed {
                    reason: e.to_string(),
                }
            })?;

        info!(
            intent_status = intent.status.as_str(),
            "Funds captured, recording escrow hold"
        );

        let paid_at = Utc::now();
        self.persist(payment_intent_id, booking_id, paid_at).await?;

        info!("Payment captured and held in escrow");

        Ok(CaptureOutcome {
            payment_intent_id: payment_intent_id.to_string(),
            booking_id: booking_id.to_string(),
            intent_status: intent.status,
            paid_at,
        })
    }

    async fn run_reconcile(
        &self,
        request: &CaptureRequest,
    ) -> Result<CaptureOutcome, CaptureError> {
        let (payment_intent_id, booking_id) = validated(request)?;
        record_ids(payment_intent_id, booking_id);

        let intent = self
            .processor
            .retrieve(payment_intent_id)
            .await
            .map_err(|e| {
                warn!(error = %e, "Processor lookup failed during reconciliation");
                CaptureError::CaptureFailed {
                    reason: e.to_string(),
                }
            })?;

        if intent.status != PaymentIntentStatus::Succeeded {
            warn!(
                intent_status = intent.status.as_str(),
                "Refusing to reconcile an intent that is not captured"
            );
            return Err(CaptureError::NotCaptured {
                status: intent.status.as_str().to_string(),
            });
        }

        // Keep the original capture time when an earlier attempt recorded it
        let paid_at = match self.store.find_payment(payment_intent_id).await {
            Ok(Some(PaymentRecord {
                paid_at: Some(at), ..
            })) => at,
            Ok(_) => Utc::now(),
            Err(e) => {
                warn!(
                    error = %e,
                    "Could not read recorded capture time, using current time"
                );
                Utc::now()
            }
        };

        self.persist(payment_intent_id, booking_id, paid_at).await?;

        info!("Local records reconciled with processor");

        Ok(CaptureOutcome {
            payment_intent_id: payment_intent_id.to_string(),
            booking_id: booking_id.to_string(),
            intent_status: intent.status,
            paid_at,
        })
    }

    async fn ensure_capturable(&self, payment_intent_id: &str) -> Result<(), CaptureError> {
        match self.store.find_payment(payment_intent_id).await {
            Ok(Some(payment)) if payment.status == PaymentStatus::Completed => {
                warn!("Payment already completed, skipping capture");
                Err(CaptureError::CaptureFailed {
                    reason: "payment intent already captured".to_string(),
                })
            }
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(CaptureError::CaptureFailed {
                reason: format!("no payment record for {}", payment_intent_id),
            }),
            Err(e) => Err(CaptureError::CaptureFailed {
                reason: format!("could not verify payment state: {}", e),
            }),
        }
    }

    /// Write the payment row, then the booking row. The booking write is
    /// never attempted unless the payment write succeeded.
    async fn persist(
        &self,
        payment_intent_id: &str,
        booking_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<(), CaptureError> {
        let store = &*self.store;

        let payment_update = PaymentHeldUpdate::at(paid_at);
        let payment_update = &payment_update;
        retry_with_backoff(&self.store_retry, "update_payment", move || {
            store.update_payment(payment_intent_id, payment_update)
        })
        .await
        .map_err(|source| {
            error!(
                error = %source,
                "Funds captured but payment record not updated; reconciliation required"
            );
            CaptureError::PersistenceFailed {
                stage: PersistenceStage::Payment,
                source,
            }
        })?;

        let booking_update = BookingStartedUpdate::default();
        let booking_update = &booking_update;
        retry_with_backoff(&self.store_retry, "update_booking", move || {
            store.update_booking(booking_id, booking_update)
        })
        .await
        .map_err(|source| {
            error!(
                error = %source,
                "Payment held but booking not advanced; reconciliation required"
            );
            CaptureError::PersistenceFailed {
                stage: PersistenceStage::Booking,
                source,
            }
        })?;

        Ok(())
    }
}

/// Check both ids are present and non-blank.
fn validated(request: &CaptureRequest) -> Result<(&str, &str), CaptureError> {
    if let Err(errors) = request.validate() {
        let mut messages: Vec<String> = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect();
        messages.sort();
        warn!(errors = ?messages, "Rejecting capture request");
        return Err(CaptureError::InvalidRequest(messages.join("; ")));
    }

    let payment_intent_id = request.payment_intent_id.as_deref().unwrap_or_default();
    let booking_id = request.booking_id.as_deref().unwrap_or_default();
    for (value, name) in [(payment_intent_id, "paymentIntentId"), (booking_id, "bookingId")] {
        if value.trim().is_empty() {
            return Err(CaptureError::InvalidRequest(format!(
                "{} must not be empty",
                name
            )));
        }
    }

    Ok((payment_intent_id, booking_id))
}

async fn joined(
    operation: &'static str,
    task: JoinHandle<Result<CaptureOutcome, CaptureError>>,
) -> Result<CaptureOutcome, CaptureError> {
    task.await.unwrap_or_else(|e| {
        error!(
            operation,
            error = %e,
            "Capture task ended without a result; reconciliation may be required"
        );
        Err(CaptureError::Interrupted {
            operation,
            reason: e.to_string(),
        })
    })
}

fn record_ids(payment_intent_id: &str, booking_id: &str) {
    let span = tracing::Span::current();
    span.record("payment_intent_id", payment_intent_id);
    span.record("booking_id", booking_id);
}

fn outcome_label(result: &Result<CaptureOutcome, CaptureError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.code(),
    }
}
