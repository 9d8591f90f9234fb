use serde::{Deserialize, Serialize};
use validator::Validate;

pub const CAPTURED_MESSAGE: &str = "Payment captured and held in escrow";
pub const RECONCILED_MESSAGE: &str = "Payment and booking reconciled with processor";

/// Body of `POST /capture-payment` and `POST /reconcile-capture`.
///
/// Both ids are optional at the serde level so an absent field reaches
/// validation instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    #[validate(
        required(message = "paymentIntentId is required"),
        length(min = 1, message = "paymentIntentId must not be empty")
    )]
    pub payment_intent_id: Option<String>,
    #[validate(
        required(message = "bookingId is required"),
        length(min = 1, message = "bookingId must not be empty")
    )]
    pub booking_id: Option<String>,
}

impl CaptureRequest {
    pub fn new(payment_intent_id: impl Into<String>, booking_id: impl Into<String>) -> Self {
        Self {
            payment_intent_id: Some(payment_intent_id.into()),
            booking_id: Some(booking_id.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CaptureResponse {
    pub success: bool,
    pub message: String,
}

impl CaptureResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}
