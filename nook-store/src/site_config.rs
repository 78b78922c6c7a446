use async_trait::async_trait;
use nook_core::repository::{ExchangeRateSource, StoreResult};
use sqlx::PgPool;
use tracing::warn;

pub const EXCHANGE_RATE_KEY: &str = "exchange_rate_mwk";

/// Admin-editable settings kept in the `site_config` key/value table.
pub struct SiteConfigRepository {
    pool: PgPool,
}

impl SiteConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM site_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO site_config (key, value, updated_at) VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ExchangeRateSource for SiteConfigRepository {
    async fn current_rate(&self) -> StoreResult<Option<f64>> {
        let Some(raw) = self.get(EXCHANGE_RATE_KEY).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<f64>() {
            Ok(rate) => Ok(Some(rate)),
            Err(_) => {
                warn!(value = %raw, "Stored exchange rate is not a number");
                Ok(None)
            }
        }
    }

    async fn set_rate(&self, rate: f64) -> StoreResult<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(format!("exchange rate must be positive, got {rate}").into());
        }
        self.set(EXCHANGE_RATE_KEY, &rate.to_string()).await
    }
}
