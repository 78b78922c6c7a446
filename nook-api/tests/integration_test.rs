use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use nook_api::middleware::{AdminClaims, GuestClaims, ADMIN_ROLE, GUEST_ROLE};
use nook_api::state::AuthConfig;
use nook_api::{app, AppState, Repositories, Settings};
use nook_booking::{CheckoutConfig, MockPaymentGateway, WebhookPolicy};
use nook_catalog::{InventoryUnit, PropertyLayout, UnitKind};
use nook_core::signature;
use nook_store::app_config::BookingRules;
use nook_store::NoopRateLimiter;
use serde_json::{json, Value};
use tower::ServiceExt;

const JWT_SECRET: &str = "test-jwt-secret";
const WEBHOOK_SECRET: &str = "whsec_test";
const HOUSE: &str = "listing_house_01";
const EXEC: &str = "listing_exec_02";
const DELUXE: &str = "listing_deluxe_03";

fn unit(id: &str, kind: UnitKind, price: i64, max_guests: u32) -> InventoryUnit {
    InventoryUnit {
        id: id.to_string(),
        name: id.to_string(),
        kind,
        price,
        max_guests,
    }
}

fn settings() -> Settings {
    Settings {
        auth: AuthConfig {
            secret: JWT_SECRET.to_string(),
        },
        layout: PropertyLayout::new(HOUSE, vec![EXEC.to_string(), DELUXE.to_string()]).unwrap(),
        checkout: CheckoutConfig {
            callback_url: "https://api.nook.test/v1/webhooks/payments".to_string(),
            return_url: "https://nook.test/bookings".to_string(),
            title: "The Nook".to_string(),
        },
        webhook: WebhookPolicy {
            secret: WEBHOOK_SECRET.to_string(),
            require_signature: true,
        },
        rules: BookingRules {
            pending_ttl_seconds: 1800,
            sweep_interval_seconds: 60,
            verification_wait_seconds: 20,
            verification_poll_seconds: 1,
            availability_debounce_ms: 300,
            fallback_exchange_rate: 1750.0,
            charge_currency: "MWK".to_string(),
        },
        rate_limit_per_minute: 100,
    }
}

fn test_app() -> Router {
    let settings = settings();
    let repos = Repositories::in_memory(
        settings.layout.clone(),
        vec![
            unit(HOUSE, UnitKind::WholeHouse, 450, 10),
            unit(EXEC, UnitKind::Room, 150, 2),
            unit(DELUXE, UnitKind::Room, 120, 2),
        ],
        Some(1750.0),
    );
    let state = AppState::new(
        repos,
        Arc::new(MockPaymentGateway::new()),
        Arc::new(NoopRateLimiter),
        settings,
    );
    app(state)
}

fn exp() -> usize {
    (chrono::Utc::now().timestamp() + 3600) as usize
}

fn guest_token(sub: &str) -> String {
    let claims = GuestClaims {
        sub: sub.to_string(),
        email: Some(format!("{}@example.com", sub)),
        role: GUEST_ROLE.to_string(),
        exp: exp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

fn admin_token() -> String {
    let claims = AdminClaims {
        sub: "admin-1".to_string(),
        email: None,
        role: ADMIN_ROLE.to_string(),
        exp: exp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn webhook(app: &Router, payload: Value, secret: &str) -> (StatusCode, Value) {
    let body = payload.to_string();
    let sig = signature::sign(secret.as_bytes(), body.as_bytes()).unwrap();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-webhook-signature", sig)
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn booking_body(unit_id: &str, check_in: &str, check_out: &str, guests: u32) -> Value {
    json!({
        "unit_id": unit_id,
        "check_in": check_in,
        "check_out": check_out,
        "guest_count": guests,
        "contact": {
            "email": "guest@example.com",
            "phone": "+265991000000",
            "first_name": "Thoko",
            "last_name": "Banda"
        }
    })
}

#[tokio::test]
async fn test_units_are_public() {
    let app = test_app();
    let (status, body) = call(&app, Method::GET, "/v1/units", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_availability_validation() {
    let app = test_app();

    let (status, _) = call(
        &app,
        Method::GET,
        "/v1/availability?unit_id=listing_exec_02&check_in=2031-03-05&check_out=2031-03-05",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::GET,
        "/v1/availability?unit_id=listing_shed_99&check_in=2031-03-05&check_out=2031-03-07",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        Method::GET,
        "/v1/availability?unit_id=listing_exec_02&check_in=2031-03-05&check_out=2031-03-07",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn test_guest_routes_require_guest_token() {
    let app = test_app();

    let (status, _) = call(&app, Method::GET, "/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/v1/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, Method::GET, "/v1/admin/bookings", Some(&guest_token("guest-1")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, Method::GET, "/v1/admin/bookings", Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_paid_booking_blocks_overlapping_stays() {
    let app = test_app();
    let token = guest_token("guest-1");

    let (status, created) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&token),
        Some(booking_body(EXEC, "2031-03-05", "2031-03-07", 2)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["booking"]["status"], "PENDING");
    assert_eq!(created["quote"]["total"], 300);
    assert_eq!(created["quote"]["charge_amount"], 525_000);
    let tx_ref = created["tx_ref"].as_str().unwrap().to_string();
    assert!(created["checkout_url"].as_str().unwrap().contains(&tx_ref));
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    let (status, outcome) = webhook(&app, json!({ "status": "success", "tx_ref": tx_ref, "amount": 525000 }), WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "confirmed");

    let (_, booking) = call(&app, Method::GET, &format!("/v1/bookings/{}", booking_id), Some(&token), None).await;
    assert_eq!(booking["status"], "CONFIRMED");

    // Duplicate delivery changes nothing
    let (status, outcome) = webhook(&app, json!({ "status": "success", "tx_ref": tx_ref }), WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "replayed");

    // Same room, overlapping night
    let (status, body) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&guest_token("guest-2")),
        Some(booking_body(EXEC, "2031-03-06", "2031-03-08", 1)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["available"], false);

    // The whole house contains the booked room
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&guest_token("guest-2")),
        Some(booking_body(HOUSE, "2031-03-01", "2031-03-06", 4)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A different room is still free, as is the checkout day
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&guest_token("guest-2")),
        Some(booking_body(DELUXE, "2031-03-05", "2031-03-07", 2)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&guest_token("guest-2")),
        Some(booking_body(EXEC, "2031-03-07", "2031-03-09", 2)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_bad_signature_changes_nothing() {
    let app = test_app();
    let token = guest_token("guest-1");

    let (_, created) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&token),
        Some(booking_body(DELUXE, "2031-04-01", "2031-04-02", 1)),
    )
    .await;
    let tx_ref = created["tx_ref"].as_str().unwrap().to_string();
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    let (status, _) = webhook(&app, json!({ "status": "success", "tx_ref": tx_ref }), "wrong-secret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let unsigned = Request::builder()
        .method(Method::POST)
        .uri("/v1/webhooks/payments")
        .body(Body::from(json!({ "status": "success", "tx_ref": tx_ref }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(unsigned).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (_, booking) = call(&app, Method::GET, &format!("/v1/bookings/{}", booking_id), Some(&token), None).await;
    assert_eq!(booking["status"], "PENDING");
}

#[tokio::test]
async fn test_bookings_are_private_to_their_guest() {
    let app = test_app();

    let (_, created) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&guest_token("guest-1")),
        Some(booking_body(EXEC, "2031-05-01", "2031-05-03", 1)),
    )
    .await;
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/v1/bookings/{}", booking_id),
        Some(&guest_token("guest-2")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, mine) = call(&app, Method::GET, "/v1/bookings", Some(&guest_token("guest-2")), None).await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_exchange_rate_change_applies_to_next_quote() {
    let app = test_app();
    let token = guest_token("guest-1");
    let quote_uri = "/v1/quote?unit_id=listing_exec_02&check_in=2031-06-01&check_out=2031-06-03";

    let (_, quote) = call(&app, Method::GET, quote_uri, Some(&token), None).await;
    assert_eq!(quote["quote"]["charge_amount"], 525_000);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/v1/admin/exchange-rate",
        Some(&admin_token()),
        Some(json!({ "rate": -5.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::PUT,
        "/v1/admin/exchange-rate",
        Some(&admin_token()),
        Some(json!({ "rate": 2000.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "stored");

    let (_, quote) = call(&app, Method::GET, quote_uri, Some(&token), None).await;
    assert_eq!(quote["quote"]["total"], 300);
    assert_eq!(quote["quote"]["charge_amount"], 600_000);
}

#[tokio::test]
async fn test_admin_unit_update_respects_layout() {
    let app = test_app();

    let (status, body) = call(
        &app,
        Method::PUT,
        "/v1/admin/units/listing_exec_02",
        Some(&admin_token()),
        Some(json!({ "name": "Executive Suite", "price": 175, "max_guests": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "ROOM");

    let (status, _) = call(
        &app,
        Method::PUT,
        "/v1/admin/units/listing_exec_02",
        Some(&admin_token()),
        Some(json!({ "name": "Executive Suite", "kind": "WHOLE_HOUSE", "price": 175, "max_guests": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::PUT,
        "/v1/admin/units/listing_shed_99",
        Some(&admin_token()),
        Some(json!({ "name": "Shed", "price": 10, "max_guests": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verification_reports_still_verifying() {
    let app = test_app();
    let token = guest_token("guest-1");

    let (_, created) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&token),
        Some(booking_body(EXEC, "2031-07-01", "2031-07-02", 1)),
    )
    .await;
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    let uri = format!("/v1/bookings/{}/verification?wait_seconds=0", booking_id);
    let (status, body) = call(&app, Method::GET, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "still_verifying");
}

#[tokio::test]
async fn test_late_success_after_failure_is_flagged() {
    let app = test_app();
    let token = guest_token("guest-1");

    let (_, created) = call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&token),
        Some(booking_body(EXEC, "2031-08-01", "2031-08-04", 2)),
    )
    .await;
    let tx_ref = created["tx_ref"].as_str().unwrap().to_string();
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();

    let (_, outcome) = webhook(&app, json!({ "status": "failed", "tx_ref": tx_ref }), WEBHOOK_SECRET).await;
    assert_eq!(outcome["outcome"], "cancelled");

    let (status, outcome) = webhook(
        &app,
        json!({ "event": "payment.success", "data": { "tx_ref": tx_ref, "amount": "787500" } }),
        WEBHOOK_SECRET,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "flagged");
    assert_eq!(outcome["reason"], "payment captured for cancelled booking");

    let (_, booking) = call(&app, Method::GET, &format!("/v1/bookings/{}", booking_id), Some(&token), None).await;
    assert_eq!(booking["status"], "CANCELLED");

    let (status, flagged) = call(&app, Method::GET, "/v1/admin/payments/flagged", Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    let flagged = flagged.as_array().unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0]["tx_ref"], tx_ref.as_str());
    assert_eq!(flagged[0]["amount"], 787_500);
}

#[tokio::test]
async fn test_reap_endpoint_leaves_fresh_pending_alone() {
    let app = test_app();

    call(
        &app,
        Method::POST,
        "/v1/bookings",
        Some(&guest_token("guest-1")),
        Some(booking_body(EXEC, "2031-09-01", "2031-09-02", 1)),
    )
    .await;

    let (status, body) = call(&app, Method::POST, "/v1/admin/bookings/reap", Some(&admin_token()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reaped"], 0);
}

#[tokio::test]
async fn test_live_availability_answers_latest_request() {
    let app = test_app();
    let token = guest_token("guest-1");

    let (status, body) = call(
        &app,
        Method::GET,
        "/v1/me/availability?unit_id=listing_house_01&check_in=2031-10-01&check_out=2031-10-03",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
    assert_eq!(body["superseded"], false);
}
