use std::time::Duration;

use async_trait::async_trait;
use nook_core::payment::{
    normalize_checkout_response, snippet, CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway,
};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tracing::{info, warn};

/// Hosted-checkout client for the payment gateway's REST API.
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: &str, secret_key: &str, timeout: Duration) -> Result<Self, GatewayError> {
        if secret_key.trim().is_empty() {
            return Err(GatewayError::Unreachable("payment gateway secret key is not configured".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let url = format!("{}/payment", self.base_url);

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key))
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        // Read as text first; the gateway does not always answer with JSON.
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;

        match normalize_checkout_response(status, &body) {
            Ok(checkout_url) => {
                info!(tx_ref = %request.tx_ref, status, "Checkout session created");
                Ok(CheckoutSession {
                    checkout_url,
                    tx_ref: request.tx_ref.clone(),
                })
            }
            Err(e) => {
                warn!(tx_ref = %request.tx_ref, status, body = %snippet(&body), "Checkout initiation failed");
                Err(e)
            }
        }
    }
}
