use serde::{Deserialize, Serialize};
use nook_shared::StayRange;

use crate::inventory::InventoryUnit;
use crate::tier::TierDetails;

/// Fallback home-currency rate per canonical unit when the rate source is unreachable.
pub const DEFAULT_EXCHANGE_RATE: f64 = 1750.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Lowest amount ever charged, so discounts can never produce a zero or negative total.
    pub minimum_charge: i64,

    /// Currency code of the converted charge amount sent to the gateway.
    pub charge_currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            minimum_charge: 1,
            charge_currency: "MWK".to_string(),
        }
    }
}

/// Full price breakdown for a stay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub unit_id: String,
    pub nights: i64,
    pub nightly_price: i64,
    pub subtotal: i64,
    pub discount_amount: i64,
    /// Amount in the canonical currency, after the tier discount.
    pub total: i64,
    pub tier_name: String,
    pub exchange_rate: f64,
    /// `total` converted to the charge currency, rounded up.
    pub charge_amount: i64,
    pub charge_currency: String,
}

pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn charge_currency(&self) -> &str {
        &self.config.charge_currency
    }

    /// Whole nights in the stay, never less than one.
    pub fn nights(stay: &StayRange) -> i64 {
        stay.nights().max(1)
    }

    pub fn subtotal(&self, unit: &InventoryUnit, stay: &StayRange) -> Result<i64, PricingError> {
        Self::nights(stay)
            .checked_mul(unit.price)
            .ok_or(PricingError::Overflow)
    }

    /// Discounted total in the canonical currency. Floors, then clamps to the minimum charge.
    pub fn compute_total(
        &self,
        unit: &InventoryUnit,
        stay: &StayRange,
        tier: &TierDetails,
    ) -> Result<i64, PricingError> {
        let subtotal = self.subtotal(unit, stay)?;
        let keep_bps = 10_000_i64 - i64::from(tier.discount_bps.min(10_000));
        let discounted = subtotal
            .checked_mul(keep_bps)
            .ok_or(PricingError::Overflow)?
            / 10_000;
        Ok(discounted.max(self.config.minimum_charge))
    }

    /// Converts a canonical amount into the charge currency, rounding up.
    pub fn convert(&self, amount: i64, rate: f64) -> Result<i64, PricingError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PricingError::InvalidExchangeRate(rate));
        }

        // Trim float noise before rounding up, so 270 * 1750 does not become 472501.
        let raw = amount as f64 * rate;
        let trimmed = (raw * 1_000_000.0).round() / 1_000_000.0;
        let converted = trimmed.ceil();
        if converted > i64::MAX as f64 {
            return Err(PricingError::Overflow);
        }
        Ok((converted as i64).max(self.config.minimum_charge))
    }

    pub fn quote(
        &self,
        unit: &InventoryUnit,
        stay: &StayRange,
        tier: &TierDetails,
        rate: f64,
    ) -> Result<Quote, PricingError> {
        let subtotal = self.subtotal(unit, stay)?;
        let total = self.compute_total(unit, stay, tier)?;
        let charge_amount = self.convert(total, rate)?;

        Ok(Quote {
            unit_id: unit.id.clone(),
            nights: Self::nights(stay),
            nightly_price: unit.price,
            subtotal,
            discount_amount: (subtotal - total).max(0),
            total,
            tier_name: tier.name.clone(),
            exchange_rate: rate,
            charge_amount,
            charge_currency: self.config.charge_currency.clone(),
        })
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("Invalid exchange rate: {0}")]
    InvalidExchangeRate(f64),

    #[error("Price calculation overflowed")]
    Overflow,
}
