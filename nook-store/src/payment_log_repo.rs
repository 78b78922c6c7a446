use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nook_core::payment::{PaymentLog, PaymentLogStatus};
use nook_core::repository::{PaymentLogRepository, StoreResult};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

const LOG_COLUMNS: &str =
    "id, booking_id, tx_ref, amount, currency, status, flag_reason, gateway_response, created_at, updated_at";

pub struct StorePaymentLogRepository {
    pool: PgPool,
}

impl StorePaymentLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentLogRow {
    id: Uuid,
    booking_id: Uuid,
    tx_ref: String,
    amount: Option<i64>,
    currency: Option<String>,
    status: String,
    flag_reason: Option<String>,
    gateway_response: Json<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentLogRow> for PaymentLog {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(row: PaymentLogRow) -> Result<Self, Self::Error> {
        let status = PaymentLogStatus::parse(&row.status)
            .ok_or_else(|| format!("unknown payment log status: {}", row.status))?;
        Ok(PaymentLog {
            id: row.id,
            booking_id: row.booking_id,
            tx_ref: row.tx_ref,
            amount: row.amount,
            currency: row.currency,
            status,
            flag_reason: row.flag_reason,
            gateway_response: row.gateway_response.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl PaymentLogRepository for StorePaymentLogRepository {
    async fn upsert(&self, log: &PaymentLog) -> StoreResult<PaymentLog> {
        // Flagged rows keep their status and reason whatever arrives later.
        let row = sqlx::query_as::<_, PaymentLogRow>(&format!(
            r#"
            INSERT INTO payment_logs ({LOG_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (tx_ref) DO UPDATE SET
                amount = COALESCE(EXCLUDED.amount, payment_logs.amount),
                currency = COALESCE(EXCLUDED.currency, payment_logs.currency),
                status = CASE WHEN payment_logs.status = 'flagged' THEN 'flagged' ELSE EXCLUDED.status END,
                flag_reason = COALESCE(payment_logs.flag_reason, EXCLUDED.flag_reason),
                gateway_response = EXCLUDED.gateway_response,
                updated_at = NOW()
            RETURNING {LOG_COLUMNS}
            "#
        ))
        .bind(log.id)
        .bind(log.booking_id)
        .bind(&log.tx_ref)
        .bind(log.amount)
        .bind(&log.currency)
        .bind(log.status.as_str())
        .bind(&log.flag_reason)
        .bind(Json(&log.gateway_response))
        .bind(log.created_at)
        .bind(log.updated_at)
        .fetch_one(&self.pool)
        .await?;
        PaymentLog::try_from(row)
    }

    async fn get_by_tx_ref(&self, tx_ref: &str) -> StoreResult<Option<PaymentLog>> {
        let row = sqlx::query_as::<_, PaymentLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM payment_logs WHERE tx_ref = $1"
        ))
        .bind(tx_ref)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentLog::try_from).transpose()
    }

    async fn list_flagged(&self) -> StoreResult<Vec<PaymentLog>> {
        let rows = sqlx::query_as::<_, PaymentLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM payment_logs WHERE status = 'flagged' ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PaymentLog::try_from).collect()
    }
}
