use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, ProductId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{NewOrder, Order, OrderItem, OrderRepository, Result};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the order migrations.
    ///
    /// Other services share the database, so versions applied by them are
    /// ignored.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn row_to_item(row: PgRow) -> std::result::Result<OrderItem, sqlx::Error> {
        let quantity: i64 = row.try_get("quantity")?;
        Ok(OrderItem {
            id: row.try_get("id")?,
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: u32::try_from(quantity).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            price: row.try_get("price")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (id, status, total_amount)
            VALUES ($1, $2, $3)
            RETURNING created_at, updated_at
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .fetch_one(&mut *tx)
        .await?;

        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, quantity, price, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                "#,
            )
            .bind(item.id)
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(i64::from(item.quantity))
            .bind(item.price)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
        }

        // Dropping the transaction on any error above rolls everything back
        tx.commit().await?;

        Ok(order.into_order(created_at, updated_at))
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let Some(row) = sqlx::query(
            "SELECT id, status, total_amount, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        let status: OrderStatus = status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        let items = sqlx::query(
            r#"
            SELECT id, product_id, quantity, price
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_item)
        .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            status,
            total_amount: row.try_get("total_amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            items,
        }))
    }

    async fn delete(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
