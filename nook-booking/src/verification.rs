use std::sync::Arc;
use std::time::Duration;

use nook_shared::models::events::BookingEvent;
use nook_shared::BookingStatus;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use uuid::Uuid;

use crate::manager::{BookingError, BookingManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Confirmed,
    Cancelled,
    /// Still PENDING when the wait ran out. Not a failure; the webhook may just be slow.
    StillVerifying,
}

/// Waits for a booking to settle after the guest returns from checkout.
///
/// Status-change events wake the waiter early; the store is also re-read every
/// `poll_interval` so a lost event or a transition made by another process is
/// still noticed.
pub struct BookingVerifier {
    manager: Arc<BookingManager>,
    poll_interval: Duration,
}

impl BookingVerifier {
    pub fn new(manager: Arc<BookingManager>, poll_interval: Duration) -> Self {
        Self { manager, poll_interval }
    }

    pub async fn await_settled(&self, booking_id: Uuid, wait: Duration) -> Result<VerificationStatus, BookingError> {
        // Subscribe before the first read so a transition in between is not missed.
        let mut events = self.manager.subscribe();
        let deadline = Instant::now() + wait;

        loop {
            let booking = self.manager.get_required(booking_id).await?;
            if let Some(settled) = settled(booking.status) {
                return Ok(settled);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(VerificationStatus::StillVerifying);
            }
            let nap = self.poll_interval.min(deadline - now);

            tokio::select! {
                event = events.recv() => match event {
                    Ok(BookingEvent::StatusChanged(e)) if e.booking_id == booking_id => {
                        if let Some(settled) = settled(e.status) {
                            return Ok(settled);
                        }
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => tokio::time::sleep(nap).await,
                },
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

fn settled(status: BookingStatus) -> Option<VerificationStatus> {
    match status {
        BookingStatus::Confirmed => Some(VerificationStatus::Confirmed),
        BookingStatus::Cancelled => Some(VerificationStatus::Cancelled),
        BookingStatus::Pending => None,
    }
}
