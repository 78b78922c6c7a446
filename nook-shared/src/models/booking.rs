use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// Booking lifecycle. PENDING is the only initial state; CONFIRMED and
/// CANCELLED are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Storage representation (lowercase, as persisted in the `bookings` table).
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "PENDING"),
            BookingStatus::Confirmed => write!(f, "CONFIRMED"),
            BookingStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StayRangeError {
    #[error("Check-out ({check_out}) must be after check-in ({check_in})")]
    NotIncreasing {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
}

/// Half-open stay interval `[check_in, check_out)`. Construction rejects
/// zero-night and inverted ranges, so every `StayRange` has at least one night.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "StayRangeParts")]
pub struct StayRange {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

#[derive(Deserialize)]
struct StayRangeParts {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl TryFrom<StayRangeParts> for StayRange {
    type Error = StayRangeError;

    fn try_from(parts: StayRangeParts) -> Result<Self, Self::Error> {
        StayRange::new(parts.check_in, parts.check_out)
    }
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, StayRangeError> {
        if check_in >= check_out {
            return Err(StayRangeError::NotIncreasing { check_in, check_out });
        }
        Ok(Self { check_in, check_out })
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Number of nights in the stay. Always at least 1.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// `self.check_in < other.check_out && self.check_out > other.check_in`
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && self.check_out > other.check_in
    }
}

impl fmt::Display for StayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

/// A reservation attempt or commitment against one inventory unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub unit_id: String,
    #[serde(flatten)]
    pub stay: StayRange,
    pub status: BookingStatus,
    pub total_amount: i64,
    pub guest_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new_pending(
        user_id: String,
        unit_id: String,
        stay: StayRange,
        total_amount: i64,
        guest_count: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            unit_id,
            stay,
            status: BookingStatus::Pending,
            total_amount,
            guest_count,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: BookingStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}
