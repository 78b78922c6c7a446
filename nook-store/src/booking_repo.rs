use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use nook_core::repository::{BookingRepository, StatusUpdate, StoreResult};
use nook_shared::{Booking, BookingStatus, StayRange};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Postgres SQLSTATE for `exclusion_violation`.
const EXCLUSION_VIOLATION: &str = "23P01";

const BOOKING_COLUMNS: &str =
    "id, user_id, unit_id, check_in, check_out, status, total_amount, guest_count, created_at, updated_at";

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, bind: &str) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE {clause} ORDER BY created_at DESC"
        ))
        .bind(bind)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    unit_id: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    status: String,
    total_amount: i64,
    guest_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            unit_id: row.unit_id,
            stay: StayRange::new(row.check_in, row.check_out)?,
            status: row.status.parse::<BookingStatus>()?,
            total_amount: row.total_amount,
            guest_count: u32::try_from(row.guest_count)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_exclusion_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == EXCLUSION_VIOLATION)
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, unit_id, check_in, check_out, status, total_amount, guest_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.user_id)
        .bind(&booking.unit_id)
        .bind(booking.stay.check_in())
        .bind(booking.stay.check_out())
        .bind(booking.status.as_str())
        .bind(booking.total_amount)
        .bind(i32::try_from(booking.guest_count)?)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_overlapping(&self, status: BookingStatus, stay: &StayRange) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = $1 AND check_in < $2 AND check_out > $3"
        ))
        .bind(status.as_str())
        .bind(stay.check_out())
        .bind(stay.check_in())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        self.fetch_where("user_id = $1", user_id).await
    }

    async fn list_all(&self) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn confirm(&self, id: Uuid, spaces: &[String]) -> StoreResult<StatusUpdate> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, NaiveDate, NaiveDate)> =
            sqlx::query_as("SELECT status, check_in, check_out FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((status, check_in, check_out)) = current else {
            return Ok(StatusUpdate::NotFound);
        };
        let status: BookingStatus = status.parse()?;
        if status != BookingStatus::Pending {
            return Ok(StatusUpdate::Unchanged(status));
        }

        // The exclusion constraint on booking_occupancy arbitrates concurrent confirms.
        let claimed = sqlx::query(
            r#"
            INSERT INTO booking_occupancy (booking_id, space_id, stay)
            SELECT $1, space, daterange($3, $4, '[)')
            FROM UNNEST($2::text[]) AS space
            "#,
        )
        .bind(id)
        .bind(spaces)
        .bind(check_in)
        .bind(check_out)
        .execute(&mut *tx)
        .await;

        match claimed {
            Ok(_) => {}
            Err(e) if is_exclusion_violation(&e) => {
                tx.rollback().await?;
                debug!(booking_id = %id, "Occupancy exclusion rejected confirmation");
                return Ok(StatusUpdate::Conflict);
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query("UPDATE bookings SET status = 'confirmed', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(StatusUpdate::Applied)
    }

    async fn cancel(&self, id: Uuid) -> StoreResult<StatusUpdate> {
        let result = sqlx::query(
            "UPDATE bookings SET status = 'cancelled', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(StatusUpdate::Applied);
        }

        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match current {
            Some((status,)) => Ok(StatusUpdate::Unchanged(status.parse()?)),
            None => Ok(StatusUpdate::NotFound),
        }
    }

    async fn list_stale_pending(&self, created_before: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE status = 'pending' AND created_at < $1"
        ))
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}
