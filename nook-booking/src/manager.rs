use std::sync::Arc;

use chrono::{DateTime, Utc};
use nook_catalog::{InventoryError, InventoryUnit, PricingError};
use nook_core::payment::GatewayError;
use nook_core::repository::{BookingRepository, StatusUpdate};
use nook_shared::models::events::{BookingEvent, BookingStatusChanged};
use nook_shared::{Booking, BookingStatus, StayRange};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityEngine;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything needed to open a PENDING booking.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: String,
    pub unit: InventoryUnit,
    pub stay: StayRange,
    pub guest_count: u32,
    pub total_amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Booking),
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed(Booking),
    AlreadyConfirmed(Booking),
    AlreadyCancelled(Booking),
    /// Someone else took the dates first; the booking was cancelled instead.
    ConflictCancelled(Booking),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Cancelled(Booking),
    AlreadyCancelled(Booking),
    AlreadyConfirmed(Booking),
}

/// Drives bookings through PENDING -> CONFIRMED | CANCELLED.
///
/// Every transition is a compare-and-set in the repository, so duplicate or
/// racing callers observe one winner and the rest get an `Already*` outcome.
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    availability: Arc<AvailabilityEngine>,
    events: broadcast::Sender<BookingEvent>,
}

impl BookingManager {
    pub fn new(bookings: Arc<dyn BookingRepository>, availability: Arc<AvailabilityEngine>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            bookings,
            availability,
            events,
        }
    }

    pub fn availability(&self) -> &AvailabilityEngine {
        &self.availability
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Fire-and-forget; no subscribers is not an error.
    pub fn publish(&self, event: BookingEvent) {
        let _ = self.events.send(event);
    }

    /// Open a PENDING booking if the unit is free right now.
    pub async fn create_pending(&self, new: NewBooking) -> Result<CreateOutcome, BookingError> {
        if new.guest_count == 0 || new.guest_count > new.unit.max_guests {
            return Err(BookingError::InvalidGuestCount {
                requested: new.guest_count,
                max: new.unit.max_guests,
            });
        }
        if new.total_amount <= 0 {
            return Err(BookingError::Validation("Total amount must be positive".to_string()));
        }

        if !self.availability.is_available(&new.unit.id, &new.stay).await? {
            info!(unit_id = %new.unit.id, stay = %new.stay, "Dates unavailable, booking not created");
            return Ok(CreateOutcome::Unavailable);
        }

        let booking = Booking::new_pending(
            new.user_id,
            new.unit.id,
            new.stay,
            new.total_amount,
            new.guest_count,
        );
        self.bookings.insert(&booking).await.map_err(BookingError::store)?;

        info!(booking_id = %booking.id, unit_id = %booking.unit_id, stay = %booking.stay, "Created pending booking");
        Ok(CreateOutcome::Created(booking))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        self.bookings.get(id).await.map_err(BookingError::store)
    }

    pub async fn get_required(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.get(id).await?.ok_or(BookingError::NotFound(id))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        self.bookings.list_for_user(user_id).await.map_err(BookingError::store)
    }

    pub async fn list_all(&self) -> Result<Vec<Booking>, BookingError> {
        self.bookings.list_all().await.map_err(BookingError::store)
    }

    pub async fn list_stale_pending(&self, created_before: DateTime<Utc>) -> Result<Vec<Booking>, BookingError> {
        self.bookings
            .list_stale_pending(created_before)
            .await
            .map_err(BookingError::store)
    }

    /// Transition: Pending → Confirmed, after re-checking the dates.
    ///
    /// A booking that lost its dates to another confirmed booking is cancelled
    /// and reported as `ConflictCancelled`; the caller decides what to do with
    /// the money.
    pub async fn confirm(&self, id: Uuid) -> Result<ConfirmOutcome, BookingError> {
        let mut booking = self.get_required(id).await?;

        match booking.status {
            BookingStatus::Confirmed => return Ok(ConfirmOutcome::AlreadyConfirmed(booking)),
            BookingStatus::Cancelled => return Ok(ConfirmOutcome::AlreadyCancelled(booking)),
            BookingStatus::Pending => {}
        }

        let still_free = self
            .availability
            .is_available_excluding(&booking.unit_id, &booking.stay, Some(id))
            .await?;
        if !still_free {
            warn!(booking_id = %id, unit_id = %booking.unit_id, "Dates taken before confirmation");
            return self.cancel_after_conflict(booking).await;
        }

        let spaces = self.availability.layout().occupied_spaces(&booking.unit_id)?;
        match self.bookings.confirm(id, &spaces).await.map_err(BookingError::store)? {
            StatusUpdate::Applied => {
                booking.update_status(BookingStatus::Confirmed);
                self.publish_status(&booking);
                info!(booking_id = %id, unit_id = %booking.unit_id, "Booking confirmed");
                Ok(ConfirmOutcome::Confirmed(booking))
            }
            StatusUpdate::Unchanged(status) => {
                booking.status = status;
                Ok(match status {
                    BookingStatus::Cancelled => ConfirmOutcome::AlreadyCancelled(booking),
                    _ => ConfirmOutcome::AlreadyConfirmed(booking),
                })
            }
            StatusUpdate::NotFound => Err(BookingError::NotFound(id)),
            StatusUpdate::Conflict => {
                warn!(booking_id = %id, unit_id = %booking.unit_id, "Lost confirmation race for dates");
                self.cancel_after_conflict(booking).await
            }
        }
    }

    /// Transition: Pending → Cancelled
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, BookingError> {
        let mut booking = self.get_required(id).await?;

        match booking.status {
            BookingStatus::Confirmed => return Ok(CancelOutcome::AlreadyConfirmed(booking)),
            BookingStatus::Cancelled => return Ok(CancelOutcome::AlreadyCancelled(booking)),
            BookingStatus::Pending => {}
        }

        match self.bookings.cancel(id).await.map_err(BookingError::store)? {
            StatusUpdate::Applied => {
                booking.update_status(BookingStatus::Cancelled);
                self.publish_status(&booking);
                info!(booking_id = %id, "Booking cancelled");
                Ok(CancelOutcome::Cancelled(booking))
            }
            StatusUpdate::Unchanged(status) => {
                booking.status = status;
                Ok(match status {
                    BookingStatus::Confirmed => CancelOutcome::AlreadyConfirmed(booking),
                    _ => CancelOutcome::AlreadyCancelled(booking),
                })
            }
            StatusUpdate::NotFound => Err(BookingError::NotFound(id)),
            StatusUpdate::Conflict => Err(BookingError::Store(format!(
                "cancel of {id} reported a space conflict"
            ))),
        }
    }

    async fn cancel_after_conflict(&self, booking: Booking) -> Result<ConfirmOutcome, BookingError> {
        Ok(match self.cancel(booking.id).await? {
            CancelOutcome::Cancelled(b) | CancelOutcome::AlreadyCancelled(b) => {
                ConfirmOutcome::ConflictCancelled(b)
            }
            // A parallel delivery confirmed it between our check and the cancel.
            CancelOutcome::AlreadyConfirmed(b) => ConfirmOutcome::AlreadyConfirmed(b),
        })
    }

    fn publish_status(&self, booking: &Booking) {
        self.publish(BookingEvent::StatusChanged(BookingStatusChanged {
            booking_id: booking.id,
            unit_id: booking.unit_id.clone(),
            status: booking.status,
            timestamp: booking.updated_at.timestamp(),
        }));
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Guest count {requested} is outside 1..={max}")]
    InvalidGuestCount { requested: u32, max: u32 },

    #[error("Booking is {0}, expected PENDING")]
    NotPending(BookingStatus),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Store error: {0}")]
    Store(String),
}

impl BookingError {
    pub fn store(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        BookingError::Store(err.to_string())
    }
}

impl From<InventoryError> for BookingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::UnknownUnit(id) => BookingError::UnknownUnit(id),
            other => BookingError::Validation(other.to_string()),
        }
    }
}

impl From<nook_core::CoreError> for BookingError {
    fn from(err: nook_core::CoreError) -> Self {
        match err {
            nook_core::CoreError::ValidationError(msg) => BookingError::Validation(msg),
            nook_core::CoreError::InternalError(msg) => BookingError::Store(msg),
        }
    }
}
