use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use nook_booking::{
    AvailabilityEngine, BookingManager, BookingVerifier, CheckoutConfig, DebouncedAvailability, PaymentOrchestrator,
    PendingReaper, QuoteService, WebhookPolicy,
};
use nook_catalog::{InventoryError, InventoryUnit, PricingConfig, PricingEngine, PropertyLayout};
use nook_core::payment::PaymentGateway;
use nook_core::repository::{BookingRepository, ExchangeRateSource, PaymentLogRepository, UnitRepository};
use nook_store::app_config::{BookingRules, Config};
use nook_store::booking_repo::StoreBookingRepository;
use nook_store::memory::{
    InMemoryBookingRepository, InMemoryExchangeRate, InMemoryPaymentLogRepository, InMemoryUnitRepository,
};
use nook_store::payment_log_repo::StorePaymentLogRepository;
use nook_store::site_config::SiteConfigRepository;
use nook_store::unit_repo::StoreUnitRepository;
use nook_store::{DbClient, RateLimiter};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<BookingManager>,
    pub quotes: Arc<QuoteService>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub verifier: Arc<BookingVerifier>,
    pub reaper: Arc<PendingReaper>,
    pub live_availability: LiveAvailability,
    pub units: Arc<dyn UnitRepository>,
    pub payment_logs: Arc<dyn PaymentLogRepository>,
    pub rates: Arc<dyn ExchangeRateSource>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub layout: PropertyLayout,
    pub auth: AuthConfig,
    pub rules: BookingRules,
    pub rate_limit_per_minute: i64,
}

/// One latest-wins availability checker per guest, so a guest's newer
/// date selection supersedes only their own older checks.
#[derive(Clone)]
pub struct LiveAvailability {
    engine: Arc<AvailabilityEngine>,
    delay: Duration,
    checkers: Arc<Mutex<HashMap<String, GuestChecker>>>,
}

struct GuestChecker {
    checker: Arc<DebouncedAvailability>,
    last_used: Instant,
}

impl LiveAvailability {
    pub fn new(engine: Arc<AvailabilityEngine>, delay: Duration) -> Self {
        Self {
            engine,
            delay,
            checkers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn for_guest(&self, guest_id: &str) -> Arc<DebouncedAvailability> {
        let mut checkers = self.checkers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = checkers.entry(guest_id.to_string()).or_insert_with(|| GuestChecker {
            checker: Arc::new(DebouncedAvailability::new(self.engine.clone(), self.delay)),
            last_used: Instant::now(),
        });
        entry.last_used = Instant::now();
        entry.checker.clone()
    }

    /// Drops checkers untouched for `max_idle` that no request is still holding.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut checkers = self.checkers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = checkers.len();
        checkers.retain(|_, c| c.last_used.elapsed() < max_idle || Arc::strong_count(&c.checker) > 1);
        before - checkers.len()
    }

    pub fn tracked_guests(&self) -> usize {
        self.checkers.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

/// Storage backends the booking services run on.
pub struct Repositories {
    pub bookings: Arc<dyn BookingRepository>,
    pub units: Arc<dyn UnitRepository>,
    pub payment_logs: Arc<dyn PaymentLogRepository>,
    pub rates: Arc<dyn ExchangeRateSource>,
}

impl Repositories {
    pub fn postgres(db: &DbClient) -> Self {
        Self {
            bookings: Arc::new(StoreBookingRepository::new(db.pool.clone())),
            units: Arc::new(StoreUnitRepository::new(db.pool.clone())),
            payment_logs: Arc::new(StorePaymentLogRepository::new(db.pool.clone())),
            rates: Arc::new(SiteConfigRepository::new(db.pool.clone())),
        }
    }

    pub fn in_memory(layout: PropertyLayout, units: Vec<InventoryUnit>, exchange_rate: Option<f64>) -> Self {
        Self {
            bookings: Arc::new(InMemoryBookingRepository::with_layout(layout)),
            units: Arc::new(InMemoryUnitRepository::with_units(units)),
            payment_logs: Arc::new(InMemoryPaymentLogRepository::new()),
            rates: Arc::new(InMemoryExchangeRate::new(exchange_rate)),
        }
    }
}

/// Everything `AppState` needs from configuration, already validated.
#[derive(Clone)]
pub struct Settings {
    pub auth: AuthConfig,
    pub layout: PropertyLayout,
    pub checkout: CheckoutConfig,
    pub webhook: WebhookPolicy,
    pub rules: BookingRules,
    pub rate_limit_per_minute: i64,
}

impl Settings {
    pub fn from_config(config: &Config) -> Result<Self, InventoryError> {
        let layout = PropertyLayout::new(config.property.house_id.clone(), config.property.room_ids.clone())?;

        Ok(Self {
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
            },
            layout,
            checkout: CheckoutConfig {
                callback_url: config.gateway.callback_url.clone(),
                return_url: config.gateway.return_url.clone(),
                title: config.gateway.checkout_title.clone(),
            },
            webhook: WebhookPolicy {
                secret: config.webhook.secret.clone(),
                require_signature: config.webhook.require_signature,
            },
            rules: config.booking_rules.clone(),
            rate_limit_per_minute: config.server.rate_limit_per_minute,
        })
    }
}

impl AppState {
    pub fn new(
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        rate_limiter: Arc<dyn RateLimiter>,
        settings: Settings,
    ) -> Self {
        let rules = settings.rules;

        let availability = Arc::new(AvailabilityEngine::new(repos.bookings.clone(), settings.layout.clone()));
        let manager = Arc::new(BookingManager::new(repos.bookings.clone(), availability.clone()));
        let live_availability =
            LiveAvailability::new(availability, Duration::from_millis(rules.availability_debounce_ms));

        let pricing = PricingEngine::new(PricingConfig {
            charge_currency: rules.charge_currency.clone(),
            ..PricingConfig::default()
        });
        let quotes = Arc::new(QuoteService::new(
            repos.units.clone(),
            repos.bookings.clone(),
            repos.rates.clone(),
            pricing,
            rules.fallback_exchange_rate,
        ));

        let orchestrator = Arc::new(PaymentOrchestrator::new(
            gateway,
            manager.clone(),
            repos.payment_logs.clone(),
            settings.checkout,
            settings.webhook,
        ));

        let verifier = Arc::new(BookingVerifier::new(
            manager.clone(),
            Duration::from_secs(rules.verification_poll_seconds.max(1)),
        ));
        let reaper = Arc::new(PendingReaper::new(
            manager.clone(),
            chrono::Duration::seconds(rules.pending_ttl_seconds as i64),
        ));

        Self {
            manager,
            quotes,
            orchestrator,
            verifier,
            reaper,
            live_availability,
            units: repos.units,
            payment_logs: repos.payment_logs,
            rates: repos.rates,
            rate_limiter,
            layout: settings.layout,
            auth: settings.auth,
            rules,
            rate_limit_per_minute: settings.rate_limit_per_minute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live() -> LiveAvailability {
        let layout = PropertyLayout::new("listing_house_01", vec!["listing_exec_02".to_string()]).unwrap();
        let engine = AvailabilityEngine::new(Arc::new(InMemoryBookingRepository::new()), layout);
        LiveAvailability::new(Arc::new(engine), Duration::from_millis(300))
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_checkers_are_evicted() {
        let live = live();
        let first = live.for_guest("guest-1");
        assert!(Arc::ptr_eq(&first, &live.for_guest("guest-1")));
        drop(first);
        live.for_guest("guest-2");

        tokio::time::advance(Duration::from_secs(300)).await;
        let held = live.for_guest("guest-3");
        assert_eq!(live.evict_idle(Duration::from_secs(120)), 2);
        assert_eq!(live.tracked_guests(), 1);

        tokio::time::advance(Duration::from_secs(300)).await;
        // Still referenced by an in-flight request.
        assert_eq!(live.evict_idle(Duration::from_secs(120)), 0);
        drop(held);
        assert_eq!(live.evict_idle(Duration::from_secs(120)), 1);
        assert_eq!(live.tracked_guests(), 0);
    }
}
