use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Row in the `payments` table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentRecord {
    pub payment_intent_id: String,
    pub status: PaymentStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub escrow_status: EscrowStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Columns created before escrow tracking hold `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    /// Written by a process this service does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    #[default]
    None,
    Held,
    Released,
    Disputed,
    #[serde(other)]
    Unknown,
}

/// Row in the `bookings` table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BookingRecord {
    pub id: String,
    pub status: BookingStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_agreed: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Requested,
    Accepted,
    PaymentAuthorized,
    InProgress,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// Fields written to the payment row once funds are captured.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PaymentHeldUpdate {
    pub status: PaymentStatus,
    pub escrow_status: EscrowStatus,
    pub paid_at: DateTime<Utc>,
}

impl PaymentHeldUpdate {
    pub fn at(paid_at: DateTime<Utc>) -> Self {
        Self {
            status: PaymentStatus::Completed,
            escrow_status: EscrowStatus::Held,
            paid_at,
        }
    }
}

/// Fields written to the booking row once its payment is held.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BookingStartedUpdate {
    pub status: BookingStatus,
    pub payment_agreed: bool,
}

impl Default for BookingStartedUpdate {
    fn default() -> Self {
        Self {
            status: BookingStatus::InProgress,
            payment_agreed: true,
        }
    }
}
