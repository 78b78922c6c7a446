//! Correlation token linking a gateway transaction back to a booking.
//!
//! Format: `nook_txn_{booking_id}_{unix_millis}`. Splitting on `_` always
//! yields the booking id at field index 2, so callbacks never need a lookup table.

use std::fmt;
use std::str::FromStr;
use chrono::Utc;
use uuid::Uuid;

pub const TX_REF_PREFIX: &str = "nook";
pub const TX_REF_TAG: &str = "txn";
pub const TX_REF_DELIMITER: char = '_';
pub const BOOKING_ID_FIELD: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxRefError {
    #[error("Booking id must be non-empty and must not contain '_': {0:?}")]
    InvalidBookingId(String),
    #[error("Malformed tx_ref: {0}")]
    Malformed(String),
    #[error("tx_ref does not carry a booking UUID: {0}")]
    NotAUuid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxRef {
    raw: String,
    booking_id: String,
}

impl TxRef {
    pub fn new(booking_id: &str, issued_at_ms: i64) -> Result<Self, TxRefError> {
        if booking_id.is_empty() || booking_id.contains(TX_REF_DELIMITER) {
            return Err(TxRefError::InvalidBookingId(booking_id.to_string()));
        }

        let raw = format!(
            "{TX_REF_PREFIX}{d}{TX_REF_TAG}{d}{booking_id}{d}{issued_at_ms}",
            d = TX_REF_DELIMITER
        );
        Ok(Self {
            raw,
            booking_id: booking_id.to_string(),
        })
    }

    /// Fresh token for a booking, suffixed with the current time.
    pub fn generate(booking_id: Uuid) -> Self {
        let issued_at_ms = Utc::now().timestamp_millis();
        let booking_id = booking_id.hyphenated().to_string();
        let raw = format!(
            "{TX_REF_PREFIX}{d}{TX_REF_TAG}{d}{booking_id}{d}{issued_at_ms}",
            d = TX_REF_DELIMITER
        );
        Self { raw, booking_id }
    }

    pub fn parse(raw: &str) -> Result<Self, TxRefError> {
        let fields: Vec<&str> = raw.split(TX_REF_DELIMITER).collect();
        if fields.len() < 4 || fields[0] != TX_REF_PREFIX || fields[1] != TX_REF_TAG {
            return Err(TxRefError::Malformed(raw.to_string()));
        }

        let booking_id = fields[BOOKING_ID_FIELD];
        if booking_id.is_empty() {
            return Err(TxRefError::Malformed(raw.to_string()));
        }

        if fields[3].parse::<i64>().is_err() {
            return Err(TxRefError::Malformed(raw.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            booking_id: booking_id.to_string(),
        })
    }

    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    pub fn booking_uuid(&self) -> Result<Uuid, TxRefError> {
        Uuid::parse_str(&self.booking_id).map_err(|_| TxRefError::NotAUuid(self.raw.clone()))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for TxRef {
    type Err = TxRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TxRef::parse(s)
    }
}
