//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ForumConfig;
use crate::services::notifications::NotificationQueue;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; provides access to the database pool,
/// configuration, and the notification queue's producer handle.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ForumConfig,
    pool: PgPool,
    notifications: NotificationQueue,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: ForumConfig, pool: PgPool, notifications: NotificationQueue) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                notifications,
            }),
        }
    }

    /// Get a reference to the forum configuration.
    #[must_use]
    pub fn config(&self) -> &ForumConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the notification queue producer handle.
    #[must_use]
    pub fn notifications(&self) -> &NotificationQueue {
        &self.inner.notifications
    }
}
