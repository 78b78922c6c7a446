use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use nook_booking::{BookingError, ReconcileError};
use nook_catalog::{InventoryError, PricingError};
use nook_shared::StayRangeError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    /// The requested dates are taken. Rendered with `"available": false`.
    ConflictError(String),
    BadGateway(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => {
                let body = Json(json!({
                    "error": msg,
                    "available": false,
                }));
                return (StatusCode::CONFLICT, body).into_response();
            }
            AppError::BadGateway(msg) => {
                tracing::warn!("Payment gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NotFound(_) | BookingError::UnknownUnit(_) => AppError::NotFoundError(err.to_string()),
            BookingError::InvalidGuestCount { .. }
            | BookingError::NotPending(_)
            | BookingError::Validation(_)
            | BookingError::Pricing(_) => AppError::ValidationError(err.to_string()),
            BookingError::Gateway(e) => AppError::BadGateway(e.to_string()),
            BookingError::Store(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::MissingSignature | ReconcileError::InvalidSignature(_) => {
                AppError::AuthenticationError(err.to_string())
            }
            ReconcileError::MalformedPayload(_) | ReconcileError::BadTxRef(_) => {
                AppError::ValidationError(err.to_string())
            }
            ReconcileError::Booking(e) => e.into(),
        }
    }
}

impl From<StayRangeError> for AppError {
    fn from(err: StayRangeError) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::UnknownUnit(_) => AppError::NotFoundError(err.to_string()),
            _ => AppError::ValidationError(err.to_string()),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        AppError::ValidationError(err.to_string())
    }
}
