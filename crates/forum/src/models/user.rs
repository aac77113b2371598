//! User domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use madrona_core::{Email, UserId};

/// A forum user (domain type).
///
/// The password hash is deliberately not part of this type; it is fetched
/// separately by the login path and never leaves the auth service.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name shown on posts.
    pub handle: String,
    /// Static API key usable as an alternative credential.
    pub api_key: String,
    /// Whether the user has admin privileges.
    pub admin: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
