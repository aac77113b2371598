//! HTTP route handlers for the forum.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                         - Redirect to /topics
//! GET  /health                   - Liveness check
//! GET  /health/ready             - Readiness check (database)
//!
//! # Topics and posts
//! GET  /topics                   - Topic listing (search + pagination)
//! POST /topics                   - Create topic (JSON, requires auth)
//! GET  /topics/{id}              - Topic detail with posts
//! POST /topics/{id}/posts        - Create post (form, requires auth)
//!
//! # Auth
//! GET  /login                    - Login page
//! POST /login                    - Login action
//! POST /logout                   - Logout action
//!
//! # Notifications
//! GET  /notifications            - Notification list (marks unread read)
//!
//! # APIs
//! POST /api/users                - Create user (JSON)
//! POST /api/notifications/delete - Delete one notification (form)
//! ```

pub mod api;
pub mod auth;
pub mod notifications;
pub mod topics;

use axum::{
    Router,
    response::Redirect,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the forum router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { Redirect::to("/topics") }))
        .route("/topics", get(topics::index).post(topics::create))
        .route("/topics/{id}", get(topics::show))
        .route("/topics/{id}/posts", post(topics::create_post))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/notifications", get(notifications::index))
        .route("/api/users", post(api::create_user))
        .route("/api/notifications/delete", post(api::delete_notification))
}
