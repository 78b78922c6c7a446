use std::sync::Arc;

use nook_catalog::{calculate_tier, InventoryUnit, PricingEngine, Quote, TierDetails};
use nook_core::repository::{BookingRepository, ExchangeRateSource, UnitRepository};
use nook_shared::StayRange;
use tracing::warn;

use crate::manager::BookingError;

/// Prices stays for a specific guest: tier from their history, rate fetched fresh.
pub struct QuoteService {
    units: Arc<dyn UnitRepository>,
    bookings: Arc<dyn BookingRepository>,
    rates: Arc<dyn ExchangeRateSource>,
    pricing: PricingEngine,
    fallback_rate: f64,
}

impl QuoteService {
    pub fn new(
        units: Arc<dyn UnitRepository>,
        bookings: Arc<dyn BookingRepository>,
        rates: Arc<dyn ExchangeRateSource>,
        pricing: PricingEngine,
        fallback_rate: f64,
    ) -> Self {
        Self {
            units,
            bookings,
            rates,
            pricing,
            fallback_rate,
        }
    }

    pub fn charge_currency(&self) -> &str {
        self.pricing.charge_currency()
    }

    pub async fn unit(&self, unit_id: &str) -> Result<InventoryUnit, BookingError> {
        self.units
            .get(unit_id)
            .await
            .map_err(BookingError::store)?
            .ok_or_else(|| BookingError::UnknownUnit(unit_id.to_string()))
    }

    pub async fn units(&self) -> Result<Vec<InventoryUnit>, BookingError> {
        self.units.list().await.map_err(BookingError::store)
    }

    pub async fn tier_for(&self, user_id: &str) -> Result<TierDetails, BookingError> {
        let history = self
            .bookings
            .list_for_user(user_id)
            .await
            .map_err(BookingError::store)?;
        Ok(calculate_tier(&history))
    }

    /// Current rate, or the configured fallback when the source is down,
    /// unset or holds something unusable.
    pub async fn exchange_rate(&self) -> f64 {
        match self.rates.current_rate().await {
            Ok(Some(rate)) if rate.is_finite() && rate > 0.0 => rate,
            Ok(Some(rate)) => {
                warn!(rate, fallback = self.fallback_rate, "Ignoring invalid stored exchange rate");
                self.fallback_rate
            }
            Ok(None) => self.fallback_rate,
            Err(e) => {
                warn!(error = %e, fallback = self.fallback_rate, "Exchange rate lookup failed, using fallback");
                self.fallback_rate
            }
        }
    }

    /// Canonical total converted to the charge currency at today's rate.
    pub async fn charge_for(&self, total: i64) -> Result<i64, BookingError> {
        let rate = self.exchange_rate().await;
        Ok(self.pricing.convert(total, rate)?)
    }

    pub async fn quote(&self, user_id: &str, unit_id: &str, stay: &StayRange) -> Result<PricedStay, BookingError> {
        let unit = self.unit(unit_id).await?;
        let tier = self.tier_for(user_id).await?;
        let rate = self.exchange_rate().await;
        let quote = self.pricing.quote(&unit, stay, &tier, rate)?;
        Ok(PricedStay { unit, tier, quote })
    }
}

#[derive(Debug, Clone)]
pub struct PricedStay {
    pub unit: InventoryUnit,
    pub tier: TierDetails,
    pub quote: Quote,
}
