//! Session token domain type.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use madrona_core::{Email, TokenId, UserId};

/// How long an issued session token stays valid.
pub const SESSION_TOKEN_TTL_HOURS: i64 = 24;

/// A server-issued session token.
///
/// Created at login and persisted; the session cookie stores only the
/// opaque `value`, which is looked up here on every authenticated request.
/// Tokens are never mutated after creation. Logout clears the session
/// pointer only; the row itself is removed by the maintenance sweep once
/// expired.
#[derive(Debug, Clone)]
pub struct SessionToken {
    /// Unique token ID.
    pub id: TokenId,
    /// Owning user.
    pub user_id: UserId,
    /// Owning user's email, denormalized for the resolution path.
    pub email: Email,
    /// Owning user's handle, denormalized for display.
    pub handle: String,
    /// The opaque bearer value stored client-side.
    pub value: String,
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// SHA-256 of `value`, stored alongside the token.
    pub integrity_hash: Vec<u8>,
}

impl SessionToken {
    /// Issue a fresh token for a user.
    #[must_use]
    pub fn issue(user_id: UserId, email: Email, handle: String, ttl: Duration) -> Self {
        let value = Uuid::new_v4().to_string();
        let integrity_hash = Sha256::digest(value.as_bytes()).to_vec();
        let now = Utc::now();

        Self {
            id: TokenId::generate(),
            user_id,
            email,
            handle,
            value,
            created_at: now,
            expires_at: now + ttl,
            integrity_hash,
        }
    }

    /// Whether the token has expired as of `now`.
    ///
    /// A token expiring exactly at `now` is expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
