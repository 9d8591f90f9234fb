//! Payment store port.

use crate::models::{BookingStartedUpdate, PaymentHeldUpdate, PaymentRecord};
use async_trait::async_trait;
use service_core::retry::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no {table} row matches {key}")]
    NotFound { table: String, key: String },

    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected store response: {0}")]
    Decode(String),
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Rejected { status, .. } => *status == 429 || *status >= 500,
            StoreError::NotFound { .. } | StoreError::Decode(_) => false,
        }
    }
}

/// Row-level operations on the `payments` and `bookings` tables.
///
/// Updates must report [`StoreError::NotFound`] when no row matched, so a
/// silent zero-row write is never mistaken for success.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Apply `update` to the payment row keyed by `payment_intent_id`.
    async fn update_payment(
        &self,
        payment_intent_id: &str,
        update: &PaymentHeldUpdate,
    ) -> Result<(), StoreError>;

    /// Apply `update` to the booking row keyed by `id`.
    async fn update_booking(
        &self,
        booking_id: &str,
        update: &BookingStartedUpdate,
    ) -> Result<(), StoreError>;

    /// Read the payment row keyed by `payment_intent_id`, if any.
    async fn find_payment(&self, payment_intent_id: &str)
        -> Result<Option<PaymentRecord>, StoreError>;
}
