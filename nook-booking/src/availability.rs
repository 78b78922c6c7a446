use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nook_catalog::{PropertyLayout, UnitKind};
use nook_core::repository::BookingRepository;
use nook_shared::{BookingStatus, StayRange};
use uuid::Uuid;

use crate::manager::BookingError;

/// Answers "can this unit be confirmed for these dates?" from CONFIRMED bookings only.
pub struct AvailabilityEngine {
    bookings: Arc<dyn BookingRepository>,
    layout: PropertyLayout,
}

impl AvailabilityEngine {
    pub fn new(bookings: Arc<dyn BookingRepository>, layout: PropertyLayout) -> Self {
        Self { bookings, layout }
    }

    pub fn layout(&self) -> &PropertyLayout {
        &self.layout
    }

    pub async fn is_available(&self, unit_id: &str, stay: &StayRange) -> Result<bool, BookingError> {
        self.is_available_excluding(unit_id, stay, None).await
    }

    /// Same as [`is_available`](Self::is_available) but ignores `exclude`, so a
    /// booking can be re-validated against everything except itself.
    pub async fn is_available_excluding(
        &self,
        unit_id: &str,
        stay: &StayRange,
        exclude: Option<Uuid>,
    ) -> Result<bool, BookingError> {
        let kind = self
            .layout
            .kind_of(unit_id)
            .ok_or_else(|| BookingError::UnknownUnit(unit_id.to_string()))?;

        let overlapping = self
            .bookings
            .find_overlapping(BookingStatus::Confirmed, stay)
            .await
            .map_err(BookingError::store)?;

        let occupied: HashSet<&str> = overlapping
            .iter()
            .filter(|b| Some(b.id) != exclude)
            .map(|b| b.unit_id.as_str())
            .collect();

        Ok(unit_free(&self.layout, kind, unit_id, &occupied))
    }
}

/// Whole house: nothing at all may be occupied. Room: neither the house nor the room itself.
fn unit_free(layout: &PropertyLayout, kind: UnitKind, unit_id: &str, occupied: &HashSet<&str>) -> bool {
    match kind {
        UnitKind::WholeHouse => occupied.is_empty(),
        UnitKind::Room => !occupied.contains(layout.house_id()) && !occupied.contains(unit_id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checked<T> {
    Fresh(T),
    /// A newer request was issued while this one was waiting or in flight.
    Superseded,
}

/// Latest-request-wins availability checks for interactive date pickers.
///
/// Each call waits out the debounce window first; if another call arrived in
/// the meantime this one resolves to `Superseded` without touching the store.
/// A result that comes back after a newer call started is also discarded.
pub struct DebouncedAvailability {
    engine: Arc<AvailabilityEngine>,
    delay: Duration,
    latest: AtomicU64,
}

impl DebouncedAvailability {
    pub fn new(engine: Arc<AvailabilityEngine>, delay: Duration) -> Self {
        Self {
            engine,
            delay,
            latest: AtomicU64::new(0),
        }
    }

    pub async fn check(&self, unit_id: &str, stay: &StayRange) -> Result<Checked<bool>, BookingError> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(self.delay).await;
        if !self.is_current(ticket) {
            return Ok(Checked::Superseded);
        }

        let available = self.engine.is_available(unit_id, stay).await?;
        if !self.is_current(ticket) {
            return Ok(Checked::Superseded);
        }
        Ok(Checked::Fresh(available))
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }
}
