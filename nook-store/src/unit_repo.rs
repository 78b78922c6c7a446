use async_trait::async_trait;
use nook_catalog::{InventoryUnit, UnitKind};
use nook_core::repository::{StoreResult, UnitRepository};
use sqlx::PgPool;

pub struct StoreUnitRepository {
    pool: PgPool,
}

impl StoreUnitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UnitRow {
    id: String,
    name: String,
    kind: String,
    price: i64,
    max_guests: i32,
}

impl TryFrom<UnitRow> for InventoryUnit {
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        let kind = UnitKind::parse(&row.kind).ok_or_else(|| format!("unknown unit kind: {}", row.kind))?;
        Ok(InventoryUnit {
            id: row.id,
            name: row.name,
            kind,
            price: row.price,
            max_guests: u32::try_from(row.max_guests)?,
        })
    }
}

#[async_trait]
impl UnitRepository for StoreUnitRepository {
    async fn get(&self, id: &str) -> StoreResult<Option<InventoryUnit>> {
        let row = sqlx::query_as::<_, UnitRow>("SELECT id, name, kind, price, max_guests FROM units WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(InventoryUnit::try_from).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<InventoryUnit>> {
        let rows = sqlx::query_as::<_, UnitRow>("SELECT id, name, kind, price, max_guests FROM units ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(InventoryUnit::try_from).collect()
    }

    async fn upsert(&self, unit: &InventoryUnit) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO units (id, name, kind, price, max_guests, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                price = EXCLUDED.price,
                max_guests = EXCLUDED.max_guests,
                updated_at = NOW()
            "#,
        )
        .bind(&unit.id)
        .bind(&unit.name)
        .bind(unit.kind.as_str())
        .bind(unit.price)
        .bind(i32::try_from(unit.max_guests)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
