use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod error;
pub mod middleware;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::{AppState, Repositories, Settings};

const RATE_LIMIT_WINDOW_SECONDS: i64 = 60;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let public = catalog::public_routes()
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    let guest = catalog::guest_routes()
        .merge(bookings::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::guest_auth_middleware,
        ));

    let admin = admin::routes().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::admin_auth_middleware,
    ));

    Router::new()
        .merge(public)
        .merge(guest)
        .merge(admin)
        .merge(webhooks::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("ratelimit:{}", ip);

    match state
        .rate_limiter
        .check_rate_limit(&key, state.rate_limit_per_minute, RATE_LIMIT_WINDOW_SECONDS)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
        Err(e) => {
            // Fail open
            tracing::warn!("Rate limiter unavailable: {}", e);
            next.run(req).await
        }
    }
}
