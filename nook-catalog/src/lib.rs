pub mod inventory;
pub mod pricing;
pub mod tier;

pub use inventory::{InventoryError, InventoryUnit, PropertyLayout, UnitKind};
pub use pricing::{PricingConfig, PricingEngine, PricingError, Quote};
pub use tier::{calculate_tier, Tier, TierDetails};
