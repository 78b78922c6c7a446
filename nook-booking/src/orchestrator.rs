use std::sync::Arc;

use chrono::Utc;
use nook_core::payment::{
    CheckoutRequest, CheckoutSession, Contact, Customization, GatewayError, GatewayEvent, PaymentGateway,
    PaymentLog, PaymentLogStatus,
};
use nook_core::repository::PaymentLogRepository;
use nook_core::signature::{self, SignatureError};
use nook_core::txref::{TxRef, TxRefError};
use nook_shared::models::events::{BookingEvent, PaymentFlaggedEvent};
use nook_shared::pii::Masked;
use nook_shared::BookingStatus;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::manager::{BookingError, BookingManager, CancelOutcome, ConfirmOutcome};

/// Where the gateway should send the guest and the server after payment.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub callback_url: String,
    /// Site page the guest lands on; verification query parameters are appended.
    pub return_url: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct WebhookPolicy {
    pub secret: String,
    /// When false, unsigned deliveries are accepted. Signed ones are always checked.
    pub require_signature: bool,
}

/// Amount actually sent to the gateway, already converted.
#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Confirmed { booking_id: Uuid },
    Cancelled { booking_id: Uuid },
    /// Duplicate delivery; the booking already carried a terminal status.
    Replayed { booking_id: Uuid, status: BookingStatus },
    /// Money captured with no reservation behind it.
    Flagged { booking_id: Uuid, reason: String },
    UnknownBooking { booking_id: Uuid },
    Ignored { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Webhook signature missing")]
    MissingSignature,

    #[error("Webhook signature rejected: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Unusable tx_ref: {0}")]
    BadTxRef(#[from] TxRefError),

    #[error(transparent)]
    Booking(#[from] BookingError),
}

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    manager: Arc<BookingManager>,
    logs: Arc<dyn PaymentLogRepository>,
    checkout: CheckoutConfig,
    webhook: WebhookPolicy,
}

impl PaymentOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        manager: Arc<BookingManager>,
        logs: Arc<dyn PaymentLogRepository>,
        checkout: CheckoutConfig,
        webhook: WebhookPolicy,
    ) -> Self {
        Self {
            gateway,
            manager,
            logs,
            checkout,
            webhook,
        }
    }

    /// Open a hosted checkout for a PENDING booking.
    pub async fn initiate(
        &self,
        booking_id: Uuid,
        contact: &Contact,
        charge: &Charge,
    ) -> Result<CheckoutSession, BookingError> {
        contact.validate()?;
        if charge.amount <= 0 {
            return Err(BookingError::Validation("Charge amount must be positive".to_string()));
        }

        let booking = self.manager.get_required(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(BookingError::NotPending(booking.status));
        }

        let tx_ref = TxRef::generate(booking.id);
        let request = CheckoutRequest {
            amount: charge.amount,
            currency: charge.currency.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone().unwrap_or_else(|| Masked(String::new())),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            callback_url: self.checkout.callback_url.clone(),
            return_url: self.return_url_for(booking.id),
            tx_ref: tx_ref.to_string(),
            customization: Customization {
                title: self.checkout.title.clone(),
                description: format!("{} for {}", booking.unit_id, booking.stay),
            },
        };

        let log = PaymentLog::new(booking.id, tx_ref.as_str(), PaymentLogStatus::Initiated)
            .with_amount(Some(charge.amount), Some(charge.currency.clone()));
        self.logs.upsert(&log).await.map_err(BookingError::store)?;

        info!(
            booking_id = %booking.id,
            tx_ref = %tx_ref,
            email = %contact.email.email_hint(),
            amount = charge.amount,
            "Initiating checkout"
        );

        match self.gateway.create_checkout(&request).await {
            Ok(session) => Ok(session),
            Err(e) => {
                let failed = PaymentLog::new(booking.id, tx_ref.as_str(), PaymentLogStatus::Failed)
                    .with_response(json!({ "error": e.to_string() }));
                if let Err(log_err) = self.logs.upsert(&failed).await {
                    warn!(tx_ref = %tx_ref, error = %log_err, "Could not record failed checkout");
                }
                error!(booking_id = %booking.id, error = %e, "Gateway refused checkout");
                Err(e.into())
            }
        }
    }

    /// Apply a gateway notification to the booking it refers to.
    ///
    /// `body` must be the raw request bytes; the signature covers them exactly.
    pub async fn reconcile(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.check_signature(body, signature)?;

        let payload: Value =
            serde_json::from_slice(body).map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;
        let event = GatewayEvent::from_payload(&payload)
            .map_err(|e| ReconcileError::MalformedPayload(e.to_string()))?;

        let (tx_ref, amount, succeeded) = match event {
            GatewayEvent::Ignored { reason } => {
                info!(%reason, "Ignoring webhook");
                return Ok(ReconcileOutcome::Ignored { reason });
            }
            GatewayEvent::Succeeded { tx_ref, amount } => (tx_ref, amount, true),
            GatewayEvent::Failed { tx_ref, amount } => (tx_ref, amount, false),
        };

        let tx_ref = TxRef::parse(&tx_ref)?;
        let booking_id = tx_ref.booking_uuid()?;

        if succeeded {
            self.on_success(booking_id, &tx_ref, amount, payload).await
        } else {
            self.on_failure(booking_id, &tx_ref, amount, payload).await
        }
    }

    fn check_signature(&self, body: &[u8], provided: Option<&str>) -> Result<(), ReconcileError> {
        match provided.map(str::trim).filter(|s| !s.is_empty()) {
            Some(sig) => {
                signature::verify(self.webhook.secret.as_bytes(), body, sig).map_err(|e| {
                    warn!(error = %e, "Rejected webhook signature");
                    ReconcileError::InvalidSignature(e)
                })
            }
            None if self.webhook.require_signature => {
                warn!("Rejected unsigned webhook");
                Err(ReconcileError::MissingSignature)
            }
            None => {
                warn!("Accepting unsigned webhook, signatures are not required");
                Ok(())
            }
        }
    }

    async fn on_success(
        &self,
        booking_id: Uuid,
        tx_ref: &TxRef,
        amount: Option<i64>,
        payload: Value,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let outcome = match self.manager.confirm(booking_id).await {
            Ok(outcome) => outcome,
            Err(BookingError::NotFound(_)) => {
                error!(%booking_id, tx_ref = %tx_ref, ?amount, "Payment succeeded for unknown booking");
                return Ok(ReconcileOutcome::UnknownBooking { booking_id });
            }
            Err(e) => return Err(e.into()),
        };

        let log = PaymentLog::new(booking_id, tx_ref.as_str(), PaymentLogStatus::Success)
            .with_amount(amount, None)
            .with_response(payload);

        match outcome {
            ConfirmOutcome::Confirmed(_) => {
                self.record(log).await?;
                Ok(ReconcileOutcome::Confirmed { booking_id })
            }
            // Only a redelivery of the capture that confirmed the booking is a replay.
            // Any other tx_ref is a second payment for the same stay.
            ConfirmOutcome::AlreadyConfirmed(_) => match self.settled_status(tx_ref).await? {
                Some(PaymentLogStatus::Success) | Some(PaymentLogStatus::Flagged) => {
                    info!(%booking_id, tx_ref = %tx_ref, "Duplicate success webhook");
                    self.record(log).await?;
                    Ok(ReconcileOutcome::Replayed {
                        booking_id,
                        status: BookingStatus::Confirmed,
                    })
                }
                _ => {
                    self.flag(log, tx_ref, amount, "duplicate payment for confirmed booking")
                        .await
                }
            },
            ConfirmOutcome::ConflictCancelled(_) => {
                self.flag(log, tx_ref, amount, "slot no longer available at confirmation")
                    .await
            }
            ConfirmOutcome::AlreadyCancelled(_) => match self.settled_status(tx_ref).await? {
                Some(PaymentLogStatus::Flagged) => {
                    info!(%booking_id, tx_ref = %tx_ref, "Duplicate success webhook for a flagged payment");
                    Ok(ReconcileOutcome::Replayed {
                        booking_id,
                        status: BookingStatus::Cancelled,
                    })
                }
                _ => {
                    self.flag(log, tx_ref, amount, "payment captured for cancelled booking")
                        .await
                }
            },
        }
    }

    async fn on_failure(
        &self,
        booking_id: Uuid,
        tx_ref: &TxRef,
        amount: Option<i64>,
        payload: Value,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let outcome = match self.manager.cancel(booking_id).await {
            Ok(outcome) => outcome,
            Err(BookingError::NotFound(_)) => {
                warn!(%booking_id, tx_ref = %tx_ref, "Payment failure for unknown booking");
                return Ok(ReconcileOutcome::UnknownBooking { booking_id });
            }
            Err(e) => return Err(e.into()),
        };

        let log = PaymentLog::new(booking_id, tx_ref.as_str(), PaymentLogStatus::Failed)
            .with_amount(amount, None)
            .with_response(payload);

        match outcome {
            CancelOutcome::Cancelled(_) => {
                self.record(log).await?;
                Ok(ReconcileOutcome::Cancelled { booking_id })
            }
            CancelOutcome::AlreadyCancelled(_) => {
                self.record(log).await?;
                Ok(ReconcileOutcome::Replayed {
                    booking_id,
                    status: BookingStatus::Cancelled,
                })
            }
            CancelOutcome::AlreadyConfirmed(_) => {
                // A failure for a transaction we already confirmed; keep the booking.
                warn!(%booking_id, tx_ref = %tx_ref, "Failure webhook for a confirmed booking");
                Ok(ReconcileOutcome::Replayed {
                    booking_id,
                    status: BookingStatus::Confirmed,
                })
            }
        }
    }

    async fn flag(
        &self,
        log: PaymentLog,
        tx_ref: &TxRef,
        amount: Option<i64>,
        reason: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let booking_id = log.booking_id;
        error!(%booking_id, tx_ref = %tx_ref, ?amount, %reason, "Payment captured without a reservation, flagged for refund");

        self.record(log.flagged(reason)).await?;
        self.manager.publish(BookingEvent::PaymentFlagged(PaymentFlaggedEvent {
            booking_id,
            tx_ref: tx_ref.to_string(),
            amount,
            reason: reason.to_string(),
            timestamp: Utc::now().timestamp(),
        }));

        Ok(ReconcileOutcome::Flagged {
            booking_id,
            reason: reason.to_string(),
        })
    }

    async fn settled_status(&self, tx_ref: &TxRef) -> Result<Option<PaymentLogStatus>, ReconcileError> {
        let log = self
            .logs
            .get_by_tx_ref(tx_ref.as_str())
            .await
            .map_err(|e| ReconcileError::Booking(BookingError::store(e)))?;
        Ok(log.map(|l| l.status))
    }

    async fn record(&self, log: PaymentLog) -> Result<PaymentLog, ReconcileError> {
        self.logs
            .upsert(&log)
            .await
            .map_err(|e| ReconcileError::Booking(BookingError::store(e)))
    }

    fn return_url_for(&self, booking_id: Uuid) -> String {
        let base = &self.checkout.return_url;
        let joiner = if base.contains('?') { '&' } else { '?' };
        format!("{base}{joiner}payment_verifying=true&booking_id={booking_id}")
    }
}

/// Gateway stand-in for local runs and tests. Hands out deterministic URLs.
#[derive(Default)]
pub struct MockPaymentGateway {
    requests: Mutex<Vec<CheckoutRequest>>,
    failure: Option<GatewayError>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: GatewayError) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        self.requests.lock().await.push(request.clone());
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(CheckoutSession {
            checkout_url: format!("https://checkout.mock/pay/{}", request.tx_ref),
            tx_ref: request.tx_ref.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AvailabilityEngine;
    use crate::manager::{CreateOutcome, NewBooking};
    use chrono::NaiveDate;
    use nook_catalog::{InventoryUnit, PropertyLayout, UnitKind};
    use nook_core::repository::BookingRepository;
    use nook_shared::{Booking, StayRange};
    use nook_store::memory::{InMemoryBookingRepository, InMemoryPaymentLogRepository};

    const SECRET: &str = "whsec_test";
    const HOUSE: &str = "listing_house_01";
    const EXEC: &str = "listing_exec_02";

    struct Harness {
        manager: Arc<BookingManager>,
        logs: Arc<InMemoryPaymentLogRepository>,
        gateway: Arc<MockPaymentGateway>,
        orchestrator: PaymentOrchestrator,
    }

    fn harness_with(gateway: MockPaymentGateway, require_signature: bool) -> Harness {
        let repo: Arc<dyn BookingRepository> = Arc::new(InMemoryBookingRepository::new());
        let layout = PropertyLayout::new(HOUSE, vec![EXEC.to_string()]).unwrap();
        let manager = Arc::new(BookingManager::new(
            repo.clone(),
            Arc::new(AvailabilityEngine::new(repo, layout)),
        ));
        let logs = Arc::new(InMemoryPaymentLogRepository::new());
        let gateway = Arc::new(gateway);
        let orchestrator = PaymentOrchestrator::new(
            gateway.clone(),
            manager.clone(),
            logs.clone(),
            CheckoutConfig {
                callback_url: "https://api.example.com/v1/webhooks/payments".to_string(),
                return_url: "https://nook.example.com/".to_string(),
                title: "The Nook".to_string(),
            },
            WebhookPolicy {
                secret: SECRET.to_string(),
                require_signature,
            },
        );
        Harness {
            manager,
            logs,
            gateway,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(MockPaymentGateway::new(), true)
    }

    fn stay(from: u32, to: u32) -> StayRange {
        StayRange::new(
            NaiveDate::from_ymd_opt(2025, 9, from).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, to).unwrap(),
        )
        .unwrap()
    }

    async fn pending(h: &Harness, unit_id: &str, stay: StayRange) -> Booking {
        let kind = if unit_id == HOUSE { UnitKind::WholeHouse } else { UnitKind::Room };
        let outcome = h
            .manager
            .create_pending(NewBooking {
                user_id: "guest-1".to_string(),
                unit: InventoryUnit {
                    id: unit_id.to_string(),
                    name: unit_id.to_string(),
                    kind,
                    price: 100,
                    max_guests: 2,
                },
                stay,
                guest_count: 1,
                total_amount: 200,
            })
            .await
            .unwrap();
        match outcome {
            CreateOutcome::Created(b) => b,
            CreateOutcome::Unavailable => panic!("expected a booking"),
        }
    }

    fn contact() -> Contact {
        Contact {
            email: Masked("jane@example.com".to_string()),
            phone: None,
            first_name: "Jane".to_string(),
            last_name: "Banda".to_string(),
        }
    }

    fn signed(body: &Value) -> (Vec<u8>, String) {
        let bytes = serde_json::to_vec(body).unwrap();
        let sig = signature::sign(SECRET.as_bytes(), &bytes).unwrap();
        (bytes, sig)
    }

    fn webhook(status: &str, booking_id: Uuid) -> (Vec<u8>, String, String) {
        let tx_ref = TxRef::generate(booking_id).to_string();
        let (bytes, sig) = signed(&json!({ "status": status, "tx_ref": tx_ref, "amount": 350000 }));
        (bytes, sig, tx_ref)
    }

    #[tokio::test]
    async fn test_initiate_builds_checkout() {
        let h = harness();
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        let charge = Charge { amount: 350_000, currency: "MWK".to_string() };

        let session = h.orchestrator.initiate(booking.id, &contact(), &charge).await.unwrap();
        let parsed = TxRef::parse(&session.tx_ref).unwrap();
        assert_eq!(parsed.booking_uuid().unwrap(), booking.id);
        assert!(session.checkout_url.ends_with(&session.tx_ref));

        let sent = h.gateway.requests().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].amount, 350_000);
        assert_eq!(
            sent[0].return_url,
            format!("https://nook.example.com/?payment_verifying=true&booking_id={}", booking.id)
        );

        let log = h.logs.get_by_tx_ref(&session.tx_ref).await.unwrap().unwrap();
        assert_eq!(log.status, PaymentLogStatus::Initiated);
    }

    #[tokio::test]
    async fn test_initiate_requires_pending_and_valid_contact() {
        let h = harness();
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        let charge = Charge { amount: 10, currency: "MWK".to_string() };

        let mut bad = contact();
        bad.email = Masked("not-an-email".to_string());
        assert!(matches!(
            h.orchestrator.initiate(booking.id, &bad, &charge).await,
            Err(BookingError::Validation(_))
        ));

        h.manager.cancel(booking.id).await.unwrap();
        assert!(matches!(
            h.orchestrator.initiate(booking.id, &contact(), &charge).await,
            Err(BookingError::NotPending(BookingStatus::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces() {
        let h = harness_with(
            MockPaymentGateway::failing(GatewayError::NoRedirect {
                status: 200,
                body_snippet: "<html>".to_string(),
            }),
            true,
        );
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        let charge = Charge { amount: 10, currency: "MWK".to_string() };

        let result = h.orchestrator.initiate(booking.id, &contact(), &charge).await;
        assert!(matches!(result, Err(BookingError::Gateway(GatewayError::NoRedirect { .. }))));
        assert_eq!(h.manager.get_required(booking.id).await.unwrap().status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_success_confirms_and_replay_is_idempotent() {
        let h = harness();
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        let (body, sig, tx_ref) = webhook("success", booking.id);

        let first = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert_eq!(first, ReconcileOutcome::Confirmed { booking_id: booking.id });

        let second = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert_eq!(
            second,
            ReconcileOutcome::Replayed { booking_id: booking.id, status: BookingStatus::Confirmed }
        );

        assert_eq!(h.manager.get_required(booking.id).await.unwrap().status, BookingStatus::Confirmed);
        let log = h.logs.get_by_tx_ref(&tx_ref).await.unwrap().unwrap();
        assert_eq!(log.status, PaymentLogStatus::Success);
        assert_eq!(log.amount, Some(350_000));
    }

    #[tokio::test]
    async fn test_second_capture_on_new_tx_ref_is_flagged() {
        let h = harness();
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        let charge = Charge { amount: 350_000, currency: "MWK".to_string() };
        let first = h.orchestrator.initiate(booking.id, &contact(), &charge).await.unwrap();
        let retry = h.orchestrator.initiate(booking.id, &contact(), &charge).await.unwrap();
        assert_ne!(first.tx_ref, retry.tx_ref);
        let mut events = h.manager.subscribe();

        let (body, sig) = signed(&json!({ "status": "success", "tx_ref": first.tx_ref, "amount": 350000 }));
        let outcome = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Confirmed { booking_id: booking.id });

        let (body, sig) = signed(&json!({ "status": "success", "tx_ref": retry.tx_ref, "amount": 350000 }));
        let outcome = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Flagged {
                booking_id: booking.id,
                reason: "duplicate payment for confirmed booking".to_string(),
            }
        );

        assert_eq!(h.manager.get_required(booking.id).await.unwrap().status, BookingStatus::Confirmed);
        let log = h.logs.get_by_tx_ref(&first.tx_ref).await.unwrap().unwrap();
        assert_eq!(log.status, PaymentLogStatus::Success);
        let log = h.logs.get_by_tx_ref(&retry.tx_ref).await.unwrap().unwrap();
        assert_eq!(log.status, PaymentLogStatus::Flagged);
        assert_eq!(h.logs.list_flagged().await.unwrap().len(), 1);

        let mut flagged = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, BookingEvent::PaymentFlagged(_)) {
                flagged += 1;
            }
        }
        assert_eq!(flagged, 1);

        // Redelivering the first capture is still a plain replay.
        let (body, sig) = signed(&json!({ "status": "success", "tx_ref": first.tx_ref }));
        let outcome = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Replayed { .. }));
        assert_eq!(h.logs.list_flagged().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_cancels() {
        let h = harness();
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        let (body, sig, _) = webhook("failed", booking.id);

        let outcome = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Cancelled { booking_id: booking.id });
        assert_eq!(h.manager.get_required(booking.id).await.unwrap().status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_late_success_for_taken_dates_is_flagged() {
        let h = harness();
        let house = pending(&h, HOUSE, stay(5, 8)).await;
        let room = pending(&h, EXEC, stay(6, 7)).await;
        let mut events = h.manager.subscribe();

        let (body, sig, _) = webhook("success", house.id);
        h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();

        let (body, sig, tx_ref) = webhook("success", room.id);
        let outcome = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Flagged { booking_id, .. } if booking_id == room.id));
        assert_eq!(h.manager.get_required(room.id).await.unwrap().status, BookingStatus::Cancelled);

        let log = h.logs.get_by_tx_ref(&tx_ref).await.unwrap().unwrap();
        assert_eq!(log.status, PaymentLogStatus::Flagged);
        assert_eq!(h.logs.list_flagged().await.unwrap().len(), 1);

        let mut saw_flag = false;
        while let Ok(event) = events.try_recv() {
            if let BookingEvent::PaymentFlagged(e) = event {
                assert_eq!(e.booking_id, room.id);
                saw_flag = true;
            }
        }
        assert!(saw_flag);

        // Replaying the flagged delivery keeps the flag and raises nothing new.
        let outcome = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Replayed { booking_id: room.id, status: BookingStatus::Cancelled }
        );
        let log = h.logs.get_by_tx_ref(&tx_ref).await.unwrap().unwrap();
        assert_eq!(log.status, PaymentLogStatus::Flagged);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_success_after_cancellation_is_flagged() {
        let h = harness();
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        h.manager.cancel(booking.id).await.unwrap();

        let (body, sig, _) = webhook("success", booking.id);
        let outcome = h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Flagged { .. }));
        assert_eq!(h.manager.get_required(booking.id).await.unwrap().status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_signature_rules() {
        let h = harness();
        let booking = pending(&h, EXEC, stay(1, 3)).await;
        let (body, _, _) = webhook("success", booking.id);

        assert!(matches!(
            h.orchestrator.reconcile(&body, None).await,
            Err(ReconcileError::MissingSignature)
        ));
        assert!(matches!(
            h.orchestrator.reconcile(&body, Some("deadbeef")).await,
            Err(ReconcileError::InvalidSignature(SignatureError::Mismatch))
        ));
        assert_eq!(h.manager.get_required(booking.id).await.unwrap().status, BookingStatus::Pending);

        let lenient = harness_with(MockPaymentGateway::new(), false);
        let booking = pending(&lenient, EXEC, stay(1, 3)).await;
        let (body, _, _) = webhook("success", booking.id);
        assert!(matches!(
            lenient.orchestrator.reconcile(&body, None).await.unwrap(),
            ReconcileOutcome::Confirmed { .. }
        ));
    }

    #[tokio::test]
    async fn test_bad_payloads() {
        let h = harness();

        let (body, sig) = signed(&json!({ "status": "success", "tx_ref": "someone_else_123" }));
        assert!(matches!(h.orchestrator.reconcile(&body, Some(&sig)).await, Err(ReconcileError::BadTxRef(_))));

        let (body, sig) = signed(&json!({ "status": "success" }));
        assert!(matches!(
            h.orchestrator.reconcile(&body, Some(&sig)).await,
            Err(ReconcileError::MalformedPayload(_))
        ));

        let (body, sig) = signed(&json!({ "status": "pending", "tx_ref": "nook_txn_x_1" }));
        assert!(matches!(
            h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap(),
            ReconcileOutcome::Ignored { .. }
        ));

        let body = b"not json".to_vec();
        let sig = signature::sign(SECRET.as_bytes(), &body).unwrap();
        assert!(matches!(
            h.orchestrator.reconcile(&body, Some(&sig)).await,
            Err(ReconcileError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_booking_is_reported() {
        let h = harness();
        let (body, sig, _) = webhook("success", Uuid::new_v4());
        assert!(matches!(
            h.orchestrator.reconcile(&body, Some(&sig)).await.unwrap(),
            ReconcileOutcome::UnknownBooking { .. }
        ));
    }
}
