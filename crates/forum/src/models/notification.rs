//! Notification domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use madrona_core::{NotificationId, UserId};

/// A unit of asynchronous, best-effort information delivered to a user.
///
/// Created by a producer (currently: replying to someone's post), carried
/// through the notification queue, and owned thereafter by the recipient's
/// notification list. `read_at` transitions from `None` to a timestamp
/// exactly once, when the recipient views their notifications.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    /// Unique notification ID.
    pub id: NotificationId,
    /// Who or what triggered the notification (a user handle).
    pub from: String,
    /// Recipient user.
    pub recipient: UserId,
    /// Human-readable message.
    pub message: String,
    /// Where the notification points (a forum path).
    pub link: String,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
    /// When the recipient first viewed it, if they have.
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Create a fresh, unread notification.
    #[must_use]
    pub fn new(from: String, recipient: UserId, message: String, link: String) -> Self {
        Self {
            id: NotificationId::generate(),
            from,
            recipient,
            message,
            link,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    /// Whether the recipient has viewed this notification.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}
