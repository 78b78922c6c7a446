use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::manager::{BookingError, BookingManager, CancelOutcome};

/// Cancels PENDING bookings whose checkout was abandoned.
pub struct PendingReaper {
    manager: Arc<BookingManager>,
    ttl: Duration,
}

impl PendingReaper {
    pub fn new(manager: Arc<BookingManager>, ttl: Duration) -> Self {
        Self { manager, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sweep using the current clock. Returns how many bookings were cancelled.
    pub async fn sweep(&self) -> Result<usize, BookingError> {
        self.sweep_at(Utc::now()).await
    }

    /// Cancel every PENDING booking created before `now - ttl`.
    ///
    /// Bookings that settle between the listing and the cancel are left alone.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize, BookingError> {
        let cutoff = now - self.ttl;
        let stale = self.manager.list_stale_pending(cutoff).await?;

        let mut reaped = 0;
        for booking in stale {
            match self.manager.cancel(booking.id).await {
                Ok(CancelOutcome::Cancelled(_)) => reaped += 1,
                Ok(_) => {}
                Err(e) => warn!(booking_id = %booking.id, error = %e, "Failed to reap pending booking"),
            }
        }

        if reaped > 0 {
            info!(reaped, %cutoff, "Reaped abandoned pending bookings");
        }
        Ok(reaped)
    }
}
