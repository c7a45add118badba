use async_trait::async_trait;
use common::{EventId, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{NotificationError, NotificationRecord, NotificationRepository, Result};

/// PostgreSQL-backed notification store.
#[derive(Clone)]
pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    /// Creates a new PostgreSQL notification store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the notification migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<NotificationRecord> {
        let kind: String = row.try_get("type")?;
        Ok(NotificationRecord {
            id: row.try_get("id")?,
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            notification_type: kind.parse().map_err(NotificationError::InvalidRecord)?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn insert(&self, record: &NotificationRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (id, event_id, order_id, type, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.event_id.as_uuid())
        .bind(record.order_id.as_uuid())
        .bind(record.notification_type.as_str())
        .bind(&record.payload)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            // Unique event id: this event was already recorded
            Err(sqlx::Error::Database(ref db_err))
                if db_err.constraint() == Some("notifications_event_id_key") =>
            {
                Ok(false)
            }
            Err(e) => Err(NotificationError::Database(e)),
        }
    }

    async fn find_by_event(&self, event_id: EventId) -> Result<Option<NotificationRecord>> {
        sqlx::query(
            r#"
            SELECT id, event_id, order_id, type, payload, created_at, updated_at
            FROM notifications
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_record)
        .transpose()
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<NotificationRecord>> {
        sqlx::query(
            r#"
            SELECT id, event_id, order_id, type, payload, created_at, updated_at
            FROM notifications
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_record)
        .collect()
    }
}
