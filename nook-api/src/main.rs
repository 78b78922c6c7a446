use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use nook_api::{app, worker, AppState, Repositories, Settings};
use nook_booking::MockPaymentGateway;
use nook_core::payment::PaymentGateway;
use nook_store::{DbClient, HttpPaymentGateway, NoopRateLimiter, RateLimiter, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nook_api=debug,nook_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = nook_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Nook API on port {}", config.server.port);

    // Database
    let db = DbClient::connect(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Rate limiting degrades to a no-op without Redis
    let rate_limiter: Arc<dyn RateLimiter> = match RedisClient::new(&config.redis.url).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
            Arc::new(NoopRateLimiter)
        }
    };

    let gateway: Arc<dyn PaymentGateway> = if config.gateway.mock {
        tracing::warn!("Using mock payment gateway");
        Arc::new(MockPaymentGateway::new())
    } else {
        Arc::new(
            HttpPaymentGateway::new(
                &config.gateway.base_url,
                &config.gateway.secret_key,
                Duration::from_secs(config.gateway.timeout_seconds),
            )
            .context("Failed to configure payment gateway")?,
        )
    };

    let settings = Settings::from_config(&config).context("Invalid property layout")?;
    let state = AppState::new(Repositories::postgres(&db), gateway, rate_limiter, settings);

    tokio::spawn(worker::start_reaper_worker(
        state.reaper.clone(),
        state.live_availability.clone(),
        Duration::from_secs(config.booking_rules.sweep_interval_seconds.max(1)),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
