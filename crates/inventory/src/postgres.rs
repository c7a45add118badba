use async_trait::async_trait;
use common::{OrderId, ProductId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    InventoryError, InventoryItem, InventoryRepository, InventoryReservation,
    InventoryTransaction, Result,
};

/// PostgreSQL-backed inventory store.
///
/// Row locks are taken with `SELECT ... FOR UPDATE` and released when the
/// transaction commits or rolls back.
#[derive(Clone)]
pub struct PostgresInventoryRepository {
    pool: PgPool,
}

impl PostgresInventoryRepository {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the inventory migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }
}

fn row_to_item(row: &PgRow) -> std::result::Result<InventoryItem, sqlx::Error> {
    Ok(InventoryItem {
        id: row.try_get("id")?,
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        available_quantity: quantity(row, "available_quantity")?,
        reserved_quantity: quantity(row, "reserved_quantity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn quantity(row: &PgRow, column: &str) -> std::result::Result<u64, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn row_to_reservation(row: &PgRow) -> std::result::Result<InventoryReservation, sqlx::Error> {
    Ok(InventoryReservation {
        id: row.try_get("id")?,
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn to_column(item: &InventoryItem, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| InventoryError::QuantityOutOfRange(item.product_id.clone()))
}

#[async_trait]
impl InventoryRepository for PostgresInventoryRepository {
    type Tx = PostgresInventoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PostgresInventoryTransaction {
            tx: self.pool.begin().await?,
        })
    }

    async fn find_item(&self, product_id: &ProductId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, available_quantity, reserved_quantity, created_at, updated_at
            FROM inventory_items
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_item).transpose()?)
    }

    async fn insert_item_if_absent(&self, item: InventoryItem) -> Result<InventoryItem> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (id, product_id, available_quantity, reserved_quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(item.id)
        .bind(item.product_id.as_str())
        .bind(to_column(&item, item.available_quantity)?)
        .bind(to_column(&item, item.reserved_quantity)?)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_item(&item.product_id)
            .await?
            .ok_or_else(|| InventoryError::StoreUnavailable(format!(
                "inventory row for {} vanished after insert",
                item.product_id
            )))
    }
}

/// Transaction over the PostgreSQL store.
pub struct PostgresInventoryTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InventoryTransaction for PostgresInventoryTransaction {
    async fn find_reservation_for_update(
        &mut self,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, created_at, updated_at
            FROM inventory_reservations
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(row_to_reservation).transpose()?)
    }

    async fn insert_reservation(&mut self, reservation: &InventoryReservation) -> Result<bool> {
        // A concurrent insert for the same order blocks here until the other
        // transaction ends, then reports the conflict as zero rows.
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_reservations (id, order_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_reservation(&mut self, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM inventory_reservations WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_item_for_update(
        &mut self,
        product_id: &ProductId,
    ) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, available_quantity, reserved_quantity, created_at, updated_at
            FROM inventory_items
            WHERE product_id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(row_to_item).transpose()?)
    }

    async fn update_item(&mut self, item: &InventoryItem) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE inventory_items
            SET available_quantity = $2, reserved_quantity = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(to_column(item, item.available_quantity)?)
        .bind(to_column(item, item.reserved_quantity)?)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
