pub mod availability;
pub mod manager;
pub mod orchestrator;
pub mod expiry;
pub mod verification;
pub mod quote;

pub use availability::{AvailabilityEngine, Checked, DebouncedAvailability};
pub use manager::{BookingError, BookingManager, CancelOutcome, ConfirmOutcome, CreateOutcome, NewBooking};
pub use orchestrator::{
    Charge, CheckoutConfig, MockPaymentGateway, PaymentOrchestrator, ReconcileError, ReconcileOutcome,
    WebhookPolicy,
};
pub use expiry::PendingReaper;
pub use verification::{BookingVerifier, VerificationStatus};
pub use quote::{PricedStay, QuoteService};
