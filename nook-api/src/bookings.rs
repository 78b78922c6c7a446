use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use futures_util::stream::{self, Stream, StreamExt};
use nook_booking::{Charge, CreateOutcome, NewBooking, VerificationStatus};
use nook_catalog::Quote;
use nook_core::payment::Contact;
use nook_shared::models::events::BookingEvent;
use nook_shared::{Booking, StayRange};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::GuestClaims;
use crate::state::AppState;

const MAX_VERIFICATION_WAIT_SECONDS: u64 = 60;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub unit_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: u32,
    pub contact: Contact,
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub booking: Booking,
    pub quote: Quote,
    pub checkout_url: String,
    pub tx_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequestBody {
    pub contact: Contact,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub booking_id: Uuid,
    pub checkout_url: String,
    pub tx_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct VerificationQuery {
    pub wait_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub booking_id: Uuid,
    pub status: VerificationStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", get(list_my_bookings).post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/checkout", post(retry_checkout))
        .route("/v1/bookings/{id}/verification", get(verify_booking))
        .route("/v1/bookings/{id}/events", get(booking_events))
}

/// Loads a booking and checks that the caller owns it.
async fn owned_booking(state: &AppState, claims: &GuestClaims, id: Uuid) -> Result<Booking, AppError> {
    let booking = state.manager.get_required(id).await?;
    if booking.user_id != claims.sub {
        return Err(AppError::AuthorizationError(
            "Booking does not belong to you".to_string(),
        ));
    }
    Ok(booking)
}

/// POST /v1/bookings
/// Price the stay, open a PENDING booking and start checkout.
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    let stay = StayRange::new(req.check_in, req.check_out)?;
    req.contact.validate().map_err(|e| AppError::ValidationError(e.to_string()))?;

    let priced = state.quotes.quote(&claims.sub, &req.unit_id, &stay).await?;

    let booking = match state
        .manager
        .create_pending(NewBooking {
            user_id: claims.sub.clone(),
            unit: priced.unit,
            stay,
            guest_count: req.guest_count,
            total_amount: priced.quote.total,
        })
        .await?
    {
        CreateOutcome::Created(booking) => booking,
        CreateOutcome::Unavailable => {
            return Err(AppError::ConflictError(
                "Selected dates are no longer available".to_string(),
            ))
        }
    };

    let charge = Charge {
        amount: priced.quote.charge_amount,
        currency: priced.quote.charge_currency.clone(),
    };
    let session = state.orchestrator.initiate(booking.id, &req.contact, &charge).await?;

    info!("Booking {} created for {}, awaiting payment", booking.id, claims.sub);

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking,
            quote: priced.quote,
            checkout_url: session.checkout_url,
            tx_ref: session.tx_ref,
        }),
    ))
}

/// GET /v1/bookings
async fn list_my_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.manager.list_for_user(&claims.sub).await?))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(owned_booking(&state, &claims, id).await?))
}

/// POST /v1/bookings/{id}/checkout
/// Retry after a failed or abandoned checkout; charged at today's rate.
async fn retry_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<CheckoutRequestBody>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let booking = owned_booking(&state, &claims, id).await?;

    let charge = Charge {
        amount: state.quotes.charge_for(booking.total_amount).await?,
        currency: state.quotes.charge_currency().to_string(),
    };
    let session = state.orchestrator.initiate(booking.id, &req.contact, &charge).await?;

    Ok(Json(CheckoutResponse {
        booking_id: booking.id,
        checkout_url: session.checkout_url,
        tx_ref: session.tx_ref,
    }))
}

/// GET /v1/bookings/{id}/verification?wait_seconds=
/// Bounded wait for the webhook after the guest returns from checkout.
async fn verify_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
    Path(id): Path<Uuid>,
    Query(query): Query<VerificationQuery>,
) -> Result<Json<VerificationResponse>, AppError> {
    owned_booking(&state, &claims, id).await?;

    let wait = query
        .wait_seconds
        .unwrap_or(state.rules.verification_wait_seconds)
        .min(MAX_VERIFICATION_WAIT_SECONDS);
    let status = state.verifier.await_settled(id, Duration::from_secs(wait)).await?;

    Ok(Json(VerificationResponse { booking_id: id, status }))
}

/// GET /v1/bookings/{id}/events
/// SSE stream of this booking's status changes, starting with the current status.
async fn booking_events(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let rx = state.manager.subscribe();
    let booking = owned_booking(&state, &claims, id).await?;

    let initial = Event::default()
        .event("status")
        .json_data(serde_json::json!({ "booking_id": booking.id, "status": booking.status }))
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let updates = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.booking_id() == id => {
                let name = match &event {
                    BookingEvent::StatusChanged(_) => "status_changed",
                    BookingEvent::PaymentFlagged(_) => "payment_flagged",
                };
                Event::default().event(name).json_data(&event).ok().map(Ok)
            }
            _ => None,
        }
    });

    let stream = stream::once(async move { Ok(initial) }).chain(updates);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
