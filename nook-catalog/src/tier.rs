use serde::{Deserialize, Serialize};
use nook_shared::{Booking, BookingStatus};

/// Loyalty tiers, derived from a guest's confirmed stays.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Entry,
    Mid,
    Top,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Entry => "Entry",
            Tier::Mid => "Mid",
            Tier::Top => "Top",
        }
    }

    /// Discount in basis points (1/100 of a percent).
    pub fn discount_bps(&self) -> u32 {
        match self {
            Tier::Entry => 0,
            Tier::Mid => 1_000,
            Tier::Top => 1_500,
        }
    }

    fn next(&self) -> Option<Tier> {
        match self {
            Tier::Entry => Some(Tier::Mid),
            Tier::Mid => Some(Tier::Top),
            Tier::Top => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierDetails {
    pub tier: Tier,
    pub name: String,
    pub discount_bps: u32,
    pub discount_rate: f64,
    pub current_count: usize,
    pub next_threshold: Option<usize>,
    pub next_tier_name: Option<String>,
    pub progress_percent: f64,
}

/// Entry: 0..=5, Mid: 6..=10, Top: 11+
pub fn tier_for_count(count: usize) -> TierDetails {
    let (tier, floor, width) = match count {
        0..=5 => (Tier::Entry, 0, 6),
        6..=10 => (Tier::Mid, 6, 5),
        _ => (Tier::Top, 11, 0),
    };

    let progress_percent = if width == 0 {
        100.0
    } else {
        (((count - floor) as f64 / width as f64) * 100.0).clamp(0.0, 100.0)
    };

    let next = tier.next();
    TierDetails {
        tier,
        name: tier.name().to_string(),
        discount_bps: tier.discount_bps(),
        discount_rate: tier.discount_bps() as f64 / 10_000.0,
        current_count: count,
        next_threshold: next.map(|_| floor + width),
        next_tier_name: next.map(|t| t.name().to_string()),
        progress_percent,
    }
}

/// Only CONFIRMED bookings count towards a tier.
pub fn calculate_tier<'a, I>(bookings: I) -> TierDetails
where
    I: IntoIterator<Item = &'a Booking>,
{
    let confirmed = bookings
        .into_iter()
        .filter(|b| b.status == BookingStatus::Confirmed)
        .count();
    tier_for_count(confirmed)
}
