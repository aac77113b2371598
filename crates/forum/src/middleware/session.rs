//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions. The session
//! holds exactly one value: the opaque session-token pointer (see
//! `models::session`).

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::ForumConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "madrona_session";

/// Session idle expiry in seconds (1 hour).
///
/// Shorter than the 24-hour token TTL: an idle session loses its pointer
/// first, the token row lingers until the maintenance sweep.
const SESSION_IDLE_SECONDS: i64 = 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// # Arguments
///
/// * `pool` - `PostgreSQL` connection pool
/// * `config` - Forum configuration (for secure-cookie detection)
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &ForumConfig,
) -> SessionManagerLayer<PostgresStore> {
    let store = PostgresStore::new(pool.clone());

    // Secure cookies when served over HTTPS
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_IDLE_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
