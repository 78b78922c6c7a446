use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use nook_booking::ReconcileOutcome;

use crate::error::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const LEGACY_SIGNATURE_HEADER: &str = "paychangu-signature";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(LEGACY_SIGNATURE_HEADER))
        .and_then(|v| v.to_str().ok())
}

/// POST /v1/webhooks/payments
/// Gateway notification. The body is taken raw because the signature covers the exact bytes.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ReconcileOutcome>, AppError> {
    tracing::info!("Received payment webhook ({} bytes)", body.len());

    let outcome = state.orchestrator.reconcile(&body, signature(&headers)).await?;
    Ok(Json(outcome))
}
