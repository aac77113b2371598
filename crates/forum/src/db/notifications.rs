//! Postgres implementation of the notification storage contract.
//!
//! Notifications are one row each. Every mutation is a single statement,
//! so the dispatcher's append, the notifications page's mark-all-read,
//! and the delete API can race on the same user without overwriting each
//! other.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use madrona_core::{NotificationId, UserId};

use super::RepositoryError;
use crate::models::Notification;
use crate::services::notifications::NotificationStore;

/// Database row for a notification.
#[derive(Debug, sqlx::FromRow)]
struct DbNotification {
    id: Uuid,
    recipient_id: Uuid,
    sender: String,
    message: String,
    link: String,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl From<DbNotification> for Notification {
    fn from(r: DbNotification) -> Self {
        Self {
            id: NotificationId::new(r.id),
            from: r.sender,
            recipient: UserId::new(r.recipient_id),
            message: r.message,
            link: r.link,
            created_at: r.created_at,
            read_at: r.read_at,
        }
    }
}

/// Postgres-backed notification store.
///
/// Owns its pool handle so the dispatcher can hold one for the process
/// lifetime; request handlers construct them per call.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    /// Create a store over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn append(&self, notification: &Notification) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO notifications (id, recipient_id, sender, message, link, created_at, read_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(notification.id.as_uuid())
        .bind(notification.recipient.as_uuid())
        .bind(&notification.from)
        .bind(&notification.message)
        .bind(&notification.link)
        .bind(notification.created_at)
        .bind(notification.read_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                // Recipient no longer exists; the dispatcher logs and drops.
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query_as::<_, DbNotification>(
            r"
            SELECT id, recipient_id, sender, message, link, created_at, read_at
            FROM notifications
            WHERE recipient_id = $1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_all_read(
        &self,
        user_id: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE notifications
            SET read_at = $2
            WHERE recipient_id = $1 AND read_at IS NULL
            ",
        )
        .bind(user_id.as_uuid())
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM notifications
            WHERE recipient_id = $1 AND id = $2
            ",
        )
        .bind(user_id.as_uuid())
        .bind(notification_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
