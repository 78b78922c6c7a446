use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use nook_catalog::InventoryUnit;
use nook_shared::{Booking, BookingStatus, StayRange};

use crate::payment::PaymentLog;

pub type StoreResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Result of a compare-and-set status transition out of PENDING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The booking was PENDING and now carries the new status.
    Applied,
    /// The booking had already left PENDING; carries the status it holds.
    Unchanged(BookingStatus),
    NotFound,
    /// Confirming would overlap an existing confirmed booking on a shared space.
    Conflict,
}

/// Repository trait for booking records
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    /// Bookings with `status` whose interval overlaps `stay`
    /// (`existing.check_in < stay.check_out AND existing.check_out > stay.check_in`).
    async fn find_overlapping(&self, status: BookingStatus, stay: &StayRange) -> StoreResult<Vec<Booking>>;

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>>;

    async fn list_all(&self) -> StoreResult<Vec<Booking>>;

    /// PENDING -> CONFIRMED, claiming `spaces` for the stay. Must refuse with
    /// `Conflict` if any space is already claimed by an overlapping confirmed booking,
    /// atomically with respect to other confirms.
    async fn confirm(&self, id: Uuid, spaces: &[String]) -> StoreResult<StatusUpdate>;

    /// PENDING -> CANCELLED.
    async fn cancel(&self, id: Uuid) -> StoreResult<StatusUpdate>;

    async fn list_stale_pending(&self, created_before: DateTime<Utc>) -> StoreResult<Vec<Booking>>;
}

/// Repository trait for inventory units
#[async_trait]
pub trait UnitRepository: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<InventoryUnit>>;

    async fn list(&self) -> StoreResult<Vec<InventoryUnit>>;

    async fn upsert(&self, unit: &InventoryUnit) -> StoreResult<()>;
}

/// Repository trait for the payment audit trail
#[async_trait]
pub trait PaymentLogRepository: Send + Sync {
    /// Insert or update by `tx_ref`. A FLAGGED row keeps its status and reason.
    async fn upsert(&self, log: &PaymentLog) -> StoreResult<PaymentLog>;

    async fn get_by_tx_ref(&self, tx_ref: &str) -> StoreResult<Option<PaymentLog>>;

    async fn list_flagged(&self) -> StoreResult<Vec<PaymentLog>>;
}

/// Home-currency units per one canonical unit.
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    async fn current_rate(&self) -> StoreResult<Option<f64>>;

    async fn set_rate(&self, rate: f64) -> StoreResult<()>;
}
