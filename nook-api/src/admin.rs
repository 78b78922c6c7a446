use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Extension, Json, Router,
};
use nook_catalog::{InventoryError, InventoryUnit, UnitKind};
use nook_core::payment::PaymentLog;
use nook_shared::Booking;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::AdminClaims;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ExchangeRateResponse {
    pub rate: f64,
    /// `"stored"` when the rate came from site config, `"fallback"` otherwise.
    pub source: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct SetExchangeRateRequest {
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUnitRequest {
    pub name: String,
    /// Defaults to the kind the property layout assigns to this id.
    pub kind: Option<UnitKind>,
    pub price: i64,
    pub max_guests: u32,
}

#[derive(Debug, Serialize)]
pub struct ReapResponse {
    pub reaped: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/exchange-rate", get(get_exchange_rate).put(set_exchange_rate))
        .route("/v1/admin/units/{id}", put(update_unit))
        .route("/v1/admin/bookings", get(list_bookings))
        .route("/v1/admin/bookings/reap", post(reap_pending))
        .route("/v1/admin/payments/flagged", get(list_flagged_payments))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/admin/exchange-rate
async fn get_exchange_rate(State(state): State<AppState>) -> Result<Json<ExchangeRateResponse>, AppError> {
    let stored = state
        .rates
        .current_rate()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .filter(|r| r.is_finite() && *r > 0.0);

    Ok(Json(match stored {
        Some(rate) => ExchangeRateResponse { rate, source: "stored" },
        None => ExchangeRateResponse {
            rate: state.rules.fallback_exchange_rate,
            source: "fallback",
        },
    }))
}

/// PUT /v1/admin/exchange-rate
/// Takes effect on the next quote; existing bookings keep their canonical total.
async fn set_exchange_rate(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Json(req): Json<SetExchangeRateRequest>,
) -> Result<Json<ExchangeRateResponse>, AppError> {
    if !req.rate.is_finite() || req.rate <= 0.0 {
        return Err(AppError::ValidationError(
            "Exchange rate must be a positive number".to_string(),
        ));
    }

    state
        .rates
        .set_rate(req.rate)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    tracing::info!("Exchange rate set to {} by {}", req.rate, claims.sub);

    Ok(Json(ExchangeRateResponse {
        rate: req.rate,
        source: "stored",
    }))
}

/// PUT /v1/admin/units/{id}
async fn update_unit(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUnitRequest>,
) -> Result<Json<InventoryUnit>, AppError> {
    let kind = match req.kind {
        Some(kind) => kind,
        None => state
            .layout
            .kind_of(&id)
            .ok_or_else(|| InventoryError::UnknownUnit(id.clone()))?,
    };

    let unit = InventoryUnit {
        id,
        name: req.name,
        kind,
        price: req.price,
        max_guests: req.max_guests,
    };
    state.layout.check_unit(&unit)?;

    state
        .units
        .upsert(&unit)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    tracing::info!("Unit {} updated by {}", unit.id, claims.sub);
    Ok(Json(unit))
}

/// GET /v1/admin/bookings
async fn list_bookings(State(state): State<AppState>) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.manager.list_all().await?))
}

/// POST /v1/admin/bookings/reap
/// Run one expiry sweep now instead of waiting for the worker.
async fn reap_pending(State(state): State<AppState>) -> Result<Json<ReapResponse>, AppError> {
    let reaped = state.reaper.sweep().await?;
    Ok(Json(ReapResponse { reaped }))
}

/// GET /v1/admin/payments/flagged
/// Captured payments that need a manual refund.
async fn list_flagged_payments(State(state): State<AppState>) -> Result<Json<Vec<PaymentLog>>, AppError> {
    let logs = state
        .payment_logs
        .list_flagged()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(Json(logs))
}
