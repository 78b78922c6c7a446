//! In-process stores for tests and database-less local runs.
//!
//! They honour the same contracts as the Postgres repositories: confirm is
//! atomic with respect to other confirms, and flagged payment logs stay flagged.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nook_catalog::{InventoryUnit, PropertyLayout};
use nook_core::payment::{PaymentLog, PaymentLogStatus};
use nook_core::repository::{
    BookingRepository, ExchangeRateSource, PaymentLogRepository, StatusUpdate, StoreResult, UnitRepository,
};
use nook_shared::{Booking, BookingStatus, StayRange};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

struct Occupancy {
    booking_id: Uuid,
    space_id: String,
    stay: StayRange,
}

#[derive(Default)]
struct BookingTables {
    bookings: HashMap<Uuid, Booking>,
    occupancy: Vec<Occupancy>,
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    tables: Mutex<BookingTables>,
    layout: Option<PropertyLayout>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that knows the property, so rows inserted already CONFIRMED
    /// claim every space their unit covers.
    pub fn with_layout(layout: PropertyLayout) -> Self {
        Self {
            tables: Mutex::default(),
            layout: Some(layout),
        }
    }

    fn seeded_spaces(&self, booking: &Booking) -> StoreResult<Vec<String>> {
        match &self.layout {
            Some(layout) => Ok(layout.occupied_spaces(&booking.unit_id)?),
            None => Ok(vec![booking.unit_id.clone()]),
        }
    }
}

fn sorted_newest_first(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    bookings
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        let spaces = if booking.status == BookingStatus::Confirmed {
            self.seeded_spaces(booking)?
        } else {
            Vec::new()
        };

        let mut tables = self.tables.lock().await;
        if tables.bookings.contains_key(&booking.id) {
            return Err(format!("duplicate booking id {}", booking.id).into());
        }
        let stay = booking.stay;
        if spaces.iter().any(|s| {
            tables
                .occupancy
                .iter()
                .any(|o| o.stay.overlaps(&stay) && o.space_id == *s)
        }) {
            return Err(format!("confirmed booking {} overlaps an occupied space", booking.id).into());
        }
        for space in spaces {
            tables.occupancy.push(Occupancy {
                booking_id: booking.id,
                space_id: space,
                stay,
            });
        }
        tables.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn find_overlapping(&self, status: BookingStatus, stay: &StayRange) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.status == status && b.stay.overlaps(stay))
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(sorted_newest_first(
            tables.bookings.values().filter(|b| b.user_id == user_id).cloned().collect(),
        ))
    }

    async fn list_all(&self) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(sorted_newest_first(tables.bookings.values().cloned().collect()))
    }

    async fn confirm(&self, id: Uuid, spaces: &[String]) -> StoreResult<StatusUpdate> {
        let mut tables = self.tables.lock().await;

        let Some(booking) = tables.bookings.get(&id) else {
            return Ok(StatusUpdate::NotFound);
        };
        if booking.status != BookingStatus::Pending {
            return Ok(StatusUpdate::Unchanged(booking.status));
        }
        let stay = booking.stay;

        let clash = tables.occupancy.iter().any(|o| {
            o.booking_id != id && o.stay.overlaps(&stay) && spaces.iter().any(|s| *s == o.space_id)
        });
        if clash {
            return Ok(StatusUpdate::Conflict);
        }

        for space in spaces {
            tables.occupancy.push(Occupancy {
                booking_id: id,
                space_id: space.clone(),
                stay,
            });
        }
        if let Some(booking) = tables.bookings.get_mut(&id) {
            booking.update_status(BookingStatus::Confirmed);
        }
        Ok(StatusUpdate::Applied)
    }

    async fn cancel(&self, id: Uuid) -> StoreResult<StatusUpdate> {
        let mut tables = self.tables.lock().await;
        match tables.bookings.get_mut(&id) {
            None => Ok(StatusUpdate::NotFound),
            Some(b) if b.status != BookingStatus::Pending => Ok(StatusUpdate::Unchanged(b.status)),
            Some(b) => {
                b.update_status(BookingStatus::Cancelled);
                Ok(StatusUpdate::Applied)
            }
        }
    }

    async fn list_stale_pending(&self, created_before: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < created_before)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryUnitRepository {
    units: RwLock<BTreeMap<String, InventoryUnit>>,
}

impl InMemoryUnitRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_units(units: impl IntoIterator<Item = InventoryUnit>) -> Self {
        Self {
            units: RwLock::new(units.into_iter().map(|u| (u.id.clone(), u)).collect()),
        }
    }
}

#[async_trait]
impl UnitRepository for InMemoryUnitRepository {
    async fn get(&self, id: &str) -> StoreResult<Option<InventoryUnit>> {
        Ok(self.units.read().await.get(id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<InventoryUnit>> {
        Ok(self.units.read().await.values().cloned().collect())
    }

    async fn upsert(&self, unit: &InventoryUnit) -> StoreResult<()> {
        self.units.write().await.insert(unit.id.clone(), unit.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPaymentLogRepository {
    logs: RwLock<HashMap<String, PaymentLog>>,
}

impl InMemoryPaymentLogRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLogRepository for InMemoryPaymentLogRepository {
    async fn upsert(&self, log: &PaymentLog) -> StoreResult<PaymentLog> {
        let mut logs = self.logs.write().await;
        let stored = match logs.get(&log.tx_ref) {
            None => log.clone(),
            Some(existing) => PaymentLog {
                id: existing.id,
                booking_id: existing.booking_id,
                tx_ref: existing.tx_ref.clone(),
                amount: log.amount.or(existing.amount),
                currency: log.currency.clone().or_else(|| existing.currency.clone()),
                status: PaymentLogStatus::merge(existing.status, log.status),
                flag_reason: existing.flag_reason.clone().or_else(|| log.flag_reason.clone()),
                gateway_response: log.gateway_response.clone(),
                created_at: existing.created_at,
                updated_at: Utc::now(),
            },
        };
        logs.insert(stored.tx_ref.clone(), stored.clone());
        Ok(stored)
    }

    async fn get_by_tx_ref(&self, tx_ref: &str) -> StoreResult<Option<PaymentLog>> {
        Ok(self.logs.read().await.get(tx_ref).cloned())
    }

    async fn list_flagged(&self) -> StoreResult<Vec<PaymentLog>> {
        let logs = self.logs.read().await;
        let mut flagged: Vec<PaymentLog> = logs
            .values()
            .filter(|l| l.status == PaymentLogStatus::Flagged)
            .cloned()
            .collect();
        flagged.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(flagged)
    }
}

pub struct InMemoryExchangeRate {
    rate: RwLock<Option<f64>>,
}

impl InMemoryExchangeRate {
    pub fn new(rate: Option<f64>) -> Self {
        Self { rate: RwLock::new(rate) }
    }
}

#[async_trait]
impl ExchangeRateSource for InMemoryExchangeRate {
    async fn current_rate(&self) -> StoreResult<Option<f64>> {
        Ok(*self.rate.read().await)
    }

    async fn set_rate(&self, rate: f64) -> StoreResult<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(format!("exchange rate must be positive, got {rate}").into());
        }
        *self.rate.write().await = Some(rate);
        Ok(())
    }
}
