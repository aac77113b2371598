//! Notification page handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::{instrument, warn};

use crate::db::notifications::PgNotificationStore;
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireUser;
use crate::models::Notification;
use crate::services::notifications::NotificationStore;
use crate::state::AppState;

/// Notification view for templates.
#[derive(Clone)]
pub struct NotificationView {
    pub id: String,
    pub from: String,
    pub message: String,
    pub link: String,
    pub created_at: String,
    pub read: bool,
}

impl From<&Notification> for NotificationView {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id.to_string(),
            from: n.from.clone(),
            message: n.message.clone(),
            link: n.link.clone(),
            created_at: n.created_at.format("%b %e, %Y %H:%M").to_string(),
            read: n.is_read(),
        }
    }
}

/// Notifications page template.
#[derive(Template, WebTemplate)]
#[template(path = "notifications.html")]
pub struct NotificationsTemplate {
    pub notifications: Vec<NotificationView>,
    pub current_user: Option<String>,
}

/// Display the user's notifications, marking unread ones read.
///
/// Viewing the page is what flips `read_at`, exactly once per
/// notification. A failed mark is non-critical: it is logged and the page
/// still renders.
#[instrument(skip(state, user))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse> {
    let store = PgNotificationStore::new(state.pool().clone());

    if let Err(e) = store.mark_all_read(user.id, Utc::now()).await {
        warn!(error = %e, user = %user.id, "failed to mark notifications read");
    }

    let notifications = store.list_for_user(user.id).await?;

    Ok(NotificationsTemplate {
        notifications: notifications.iter().map(NotificationView::from).collect(),
        current_user: Some(user.handle),
    })
}
