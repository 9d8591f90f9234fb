//! Payment processor port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processor-side handle for an authorized or captured charge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub amount_received: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentIntentStatus::RequiresPaymentMethod => "requires_payment_method",
            PaymentIntentStatus::RequiresConfirmation => "requires_confirmation",
            PaymentIntentStatus::RequiresAction => "requires_action",
            PaymentIntentStatus::Processing => "processing",
            PaymentIntentStatus::RequiresCapture => "requires_capture",
            PaymentIntentStatus::Canceled => "canceled",
            PaymentIntentStatus::Succeeded => "succeeded",
            PaymentIntentStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("payment processor credentials not configured")]
    NotConfigured,

    #[error("payment processor unreachable: {0}")]
    Transport(String),

    #[error("payment processor rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected payment processor response: {0}")]
    Decode(String),

    #[error("payment intent {0} was already captured")]
    AlreadyCaptured(String),
}

impl ProcessorError {
    /// Whether the same call could succeed later without any change on our side.
    pub fn is_transient(&self) -> bool {
        match self {
            ProcessorError::Transport(_) => true,
            ProcessorError::Rejected { status, .. } => *status == 429 || *status >= 500,
            ProcessorError::NotConfigured
            | ProcessorError::Decode(_)
            | ProcessorError::AlreadyCaptured(_) => false,
        }
    }
}

/// Operations this service needs from the payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Capture previously authorized funds. Moves real money.
    async fn capture(&self, payment_intent_id: &str) -> Result<PaymentIntent, ProcessorError>;

    /// Read the current state of an intent without changing it.
    async fn retrieve(&self, payment_intent_id: &str) -> Result<PaymentIntent, ProcessorError>;
}
