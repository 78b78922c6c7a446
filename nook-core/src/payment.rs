use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use nook_shared::pii::Masked;

use crate::CoreError;

const SNIPPET_LEN: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentLogStatus {
    Initiated,
    Success,
    Failed,
    /// Funds were captured but no reservation stands behind them; needs a manual refund.
    Flagged,
}

impl PaymentLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentLogStatus::Initiated => "initiated",
            PaymentLogStatus::Success => "success",
            PaymentLogStatus::Failed => "failed",
            PaymentLogStatus::Flagged => "flagged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "initiated" => Some(PaymentLogStatus::Initiated),
            "success" => Some(PaymentLogStatus::Success),
            "failed" => Some(PaymentLogStatus::Failed),
            "flagged" => Some(PaymentLogStatus::Flagged),
            _ => None,
        }
    }

    /// A flagged log stays flagged; later deliveries must not bury the refund trail.
    pub fn merge(existing: PaymentLogStatus, incoming: PaymentLogStatus) -> PaymentLogStatus {
        if existing == PaymentLogStatus::Flagged {
            PaymentLogStatus::Flagged
        } else {
            incoming
        }
    }
}

/// One row per gateway transaction, keyed by `tx_ref`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentLog {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub tx_ref: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub status: PaymentLogStatus,
    pub flag_reason: Option<String>,
    pub gateway_response: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentLog {
    pub fn new(booking_id: Uuid, tx_ref: &str, status: PaymentLogStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            tx_ref: tx_ref.to_string(),
            amount: None,
            currency: None,
            status,
            flag_reason: None,
            gateway_response: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_amount(mut self, amount: Option<i64>, currency: Option<String>) -> Self {
        self.amount = amount;
        self.currency = currency;
        self
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.gateway_response = response;
        self
    }

    pub fn flagged(mut self, reason: impl Into<String>) -> Self {
        self.status = PaymentLogStatus::Flagged;
        self.flag_reason = Some(reason.into());
        self
    }
}

/// Guest contact details sent to the hosted checkout page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub email: Masked<String>,
    #[serde(default)]
    pub phone: Option<Masked<String>>,
    pub first_name: String,
    pub last_name: String,
}

impl Contact {
    pub fn validate(&self) -> Result<(), CoreError> {
        let email = self.email.expose().trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::ValidationError("A valid email address is required".to_string()));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(CoreError::ValidationError("First and last name are required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Customization {
    pub title: String,
    pub description: String,
}

/// Body of the gateway's initiate call.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub amount: i64,
    pub currency: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
    pub first_name: String,
    pub last_name: String,
    pub callback_url: String,
    pub return_url: String,
    pub tx_ref: String,
    pub customization: Customization,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub tx_ref: String,
}

/// Each variant implies a different remedy for the guest, so they stay distinct.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("Could not reach the payment gateway: {0}")]
    Unreachable(String),

    #[error("Payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Payment gateway accepted the request but returned no checkout URL ({status}): {body_snippet}")]
    NoRedirect { status: u16, body_snippet: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session and return the URL to redirect the guest to.
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;
}

/// First `SNIPPET_LEN` characters of a response body, for logs and errors.
pub fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_LEN).collect()
}

/// Normalizes the gateway's initiate response into a checkout URL.
///
/// The URL may appear at `checkout_url` or `data.checkout_url`. A body that
/// is not JSON, or JSON with no URL, is `NoRedirect` on 2xx; non-2xx
/// responses and explicit error payloads are `Rejected`.
pub fn normalize_checkout_response(status: u16, body: &str) -> Result<String, GatewayError> {
    let success_status = (200..300).contains(&status);
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let Some(json) = parsed else {
        return Err(if success_status {
            GatewayError::NoRedirect { status, body_snippet: snippet(body) }
        } else {
            GatewayError::Rejected { status, message: snippet(body) }
        });
    };

    let url = json
        .get("checkout_url")
        .and_then(Value::as_str)
        .or_else(|| json.pointer("/data/checkout_url").and_then(Value::as_str))
        .filter(|u| !u.trim().is_empty());

    let declared_error = matches!(
        json.get("status").and_then(Value::as_str),
        Some("error") | Some("failed")
    );

    match url {
        Some(url) if success_status && !declared_error => Ok(url.to_string()),
        _ if !success_status || declared_error => Err(GatewayError::Rejected {
            status,
            message: json
                .get("message")
                .and_then(|m| m.as_str().map(str::to_string).or_else(|| Some(m.to_string())))
                .unwrap_or_else(|| "Payment Gateway Error".to_string()),
        }),
        _ => Err(GatewayError::NoRedirect { status, body_snippet: snippet(body) }),
    }
}

/// Webhook payload after normalization at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Succeeded { tx_ref: String, amount: Option<i64> },
    Failed { tx_ref: String, amount: Option<i64> },
    Ignored { reason: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("Webhook payload is missing tx_ref")]
    MissingTxRef,
}

impl GatewayEvent {
    pub fn from_payload(json: &Value) -> Result<Self, PayloadError> {
        let status = json.get("status").and_then(Value::as_str);
        let event = json.get("event").and_then(Value::as_str);

        let succeeded = status == Some("success") || event == Some("payment.success");
        let failed = status == Some("failed") || event == Some("payment.failed");

        if !succeeded && !failed {
            let reason = format!(
                "unhandled webhook (status={:?}, event={:?})",
                status.unwrap_or("-"),
                event.unwrap_or("-")
            );
            return Ok(GatewayEvent::Ignored { reason });
        }

        let tx_ref = field(json, "tx_ref")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(PayloadError::MissingTxRef)?
            .to_string();
        let amount = field(json, "amount").and_then(amount_of);

        if succeeded {
            Ok(GatewayEvent::Succeeded { tx_ref, amount })
        } else {
            Ok(GatewayEvent::Failed { tx_ref, amount })
        }
    }
}

fn field<'a>(json: &'a Value, name: &str) -> Option<&'a Value> {
    json.get(name).or_else(|| json.get("data").and_then(|d| d.get(name)))
}

fn amount_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}
