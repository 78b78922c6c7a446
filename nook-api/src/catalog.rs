use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::NaiveDate;
use nook_booking::Checked;
use nook_catalog::{InventoryUnit, Quote, TierDetails};
use nook_shared::StayRange;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::GuestClaims;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StayQuery {
    pub unit_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayQuery {
    fn stay(&self) -> Result<StayRange, AppError> {
        Ok(StayRange::new(self.check_in, self.check_out)?)
    }
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub unit_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct LiveAvailabilityResponse {
    pub unit_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    /// Absent when a newer check from the same guest replaced this one.
    pub available: Option<bool>,
    pub superseded: bool,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub unit: InventoryUnit,
    pub tier: TierDetails,
    pub quote: Quote,
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/units", get(list_units))
        .route("/v1/availability", get(check_availability))
}

pub fn guest_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/quote", get(get_quote))
        .route("/v1/me/tier", get(get_my_tier))
        .route("/v1/me/availability", get(check_availability_live))
}

/// GET /v1/units
async fn list_units(State(state): State<AppState>) -> Result<Json<Vec<InventoryUnit>>, AppError> {
    Ok(Json(state.quotes.units().await?))
}

/// GET /v1/availability?unit_id=&check_in=&check_out=
async fn check_availability(
    State(state): State<AppState>,
    Query(query): Query<StayQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let stay = query.stay()?;
    let available = state
        .manager
        .availability()
        .is_available(&query.unit_id, &stay)
        .await?;

    Ok(Json(AvailabilityResponse {
        unit_id: query.unit_id,
        check_in: stay.check_in(),
        check_out: stay.check_out(),
        available,
    }))
}

/// GET /v1/me/availability?unit_id=&check_in=&check_out=
/// Debounced check for interactive date picking. Only the guest's latest request gets an answer.
async fn check_availability_live(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
    Query(query): Query<StayQuery>,
) -> Result<Json<LiveAvailabilityResponse>, AppError> {
    let stay = query.stay()?;
    let checker = state.live_availability.for_guest(&claims.sub);

    let available = match checker.check(&query.unit_id, &stay).await? {
        Checked::Fresh(available) => Some(available),
        Checked::Superseded => None,
    };

    Ok(Json(LiveAvailabilityResponse {
        unit_id: query.unit_id,
        check_in: stay.check_in(),
        check_out: stay.check_out(),
        available,
        superseded: available.is_none(),
    }))
}

/// GET /v1/quote?unit_id=&check_in=&check_out=
async fn get_quote(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
    Query(query): Query<StayQuery>,
) -> Result<Json<QuoteResponse>, AppError> {
    let stay = query.stay()?;
    let priced = state.quotes.quote(&claims.sub, &query.unit_id, &stay).await?;

    Ok(Json(QuoteResponse {
        unit: priced.unit,
        tier: priced.tier,
        quote: priced.quote,
    }))
}

/// GET /v1/me/tier
async fn get_my_tier(
    State(state): State<AppState>,
    Extension(claims): Extension<GuestClaims>,
) -> Result<Json<TierDetails>, AppError> {
    Ok(Json(state.quotes.tier_for(&claims.sub).await?))
}
