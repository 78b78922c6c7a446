use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    pub booking_rules: BookingRules,
    pub property: PropertyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 { 100 }

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout() -> u64 { 3 }
fn default_idle_timeout() -> u64 { 600 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: String,
    /// Server endpoint the gateway posts notifications to.
    pub callback_url: String,
    /// Site page the guest is sent back to after checkout.
    pub return_url: String,
    #[serde(default = "default_checkout_title")]
    pub checkout_title: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
    /// Use the in-process mock gateway instead of calling out.
    #[serde(default)]
    pub mock: bool,
}

fn default_checkout_title() -> String { "The Nook".to_string() }
fn default_gateway_timeout() -> u64 { 15 }

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub secret: String,
    #[serde(default = "default_true")]
    pub require_signature: bool,
}

fn default_true() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_verification_wait")]
    pub verification_wait_seconds: u64,
    #[serde(default = "default_verification_poll")]
    pub verification_poll_seconds: u64,
    #[serde(default = "default_debounce")]
    pub availability_debounce_ms: u64,
    #[serde(default = "default_exchange_rate")]
    pub fallback_exchange_rate: f64,
    #[serde(default = "default_charge_currency")]
    pub charge_currency: String,
}

fn default_pending_ttl() -> u64 { 1800 }
fn default_sweep_interval() -> u64 { 60 }
fn default_verification_wait() -> u64 { 20 }
fn default_verification_poll() -> u64 { 2 }
fn default_debounce() -> u64 { 300 }
fn default_exchange_rate() -> f64 { 1750.0 }
fn default_charge_currency() -> String { "MWK".to_string() }

/// Which unit id is the whole house and which are its rooms.
#[derive(Debug, Deserialize, Clone)]
pub struct PropertyConfig {
    pub house_id: String,
    pub room_ids: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `NOOK_WEBHOOK__SECRET=...` sets `webhook.secret`
            .add_source(config::Environment::with_prefix("NOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
