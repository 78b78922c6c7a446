use uuid::Uuid;

use crate::models::booking::BookingStatus;

/// Published whenever a booking transition is actually applied.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingStatusChanged {
    pub booking_id: Uuid,
    pub unit_id: String,
    pub status: BookingStatus,
    pub timestamp: i64,
}

/// A captured payment that has no reservation behind it and needs a manual refund.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct PaymentFlaggedEvent {
    pub booking_id: Uuid,
    pub tx_ref: String,
    pub amount: Option<i64>,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    StatusChanged(BookingStatusChanged),
    PaymentFlagged(PaymentFlaggedEvent),
}

impl BookingEvent {
    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::StatusChanged(e) => e.booking_id,
            BookingEvent::PaymentFlagged(e) => e.booking_id,
        }
    }
}
