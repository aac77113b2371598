//! Session-token repository and the expired-token sweeper.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use madrona_core::{Email, TokenId, UserId};

use super::RepositoryError;
use crate::models::SessionToken;
use crate::services::identity::TokenStore;
use crate::services::notifications::TokenSweeper;

/// Database row for a session token.
#[derive(Debug, sqlx::FromRow)]
struct DbToken {
    id: Uuid,
    user_id: Uuid,
    email: String,
    handle: String,
    token: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    integrity_hash: Vec<u8>,
}

impl DbToken {
    fn into_token(self) -> Result<SessionToken, RepositoryError> {
        let email = Email::parse(&self.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email on token row: {e}"))
        })?;

        Ok(SessionToken {
            id: TokenId::new(self.id),
            user_id: UserId::new(self.user_id),
            email,
            handle: self.handle,
            value: self.token,
            created_at: self.created_at,
            expires_at: self.expires_at,
            integrity_hash: self.integrity_hash,
        })
    }
}

/// Repository for session-token operations.
pub struct TokenRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenRepository<'a> {
    /// Create a new token repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist a freshly issued token. Tokens are never updated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn save(&self, token: &SessionToken) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO tokens (id, user_id, email, handle, token, created_at, expires_at, integrity_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(token.id.as_uuid())
        .bind(token.user_id.as_uuid())
        .bind(token.email.as_str())
        .bind(&token.handle)
        .bind(&token.value)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(&token.integrity_hash)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Find a token by its opaque bearer value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_value(&self, value: &str) -> Result<Option<SessionToken>, RepositoryError> {
        let row = sqlx::query_as::<_, DbToken>(
            r"
            SELECT id, user_id, email, handle, token, created_at, expires_at, integrity_hash
            FROM tokens
            WHERE token = $1
            ",
        )
        .bind(value)
        .fetch_optional(self.pool)
        .await?;

        row.map(DbToken::into_token).transpose()
    }
}

#[async_trait]
impl TokenStore for TokenRepository<'_> {
    async fn find_by_value(&self, value: &str) -> Result<Option<SessionToken>, RepositoryError> {
        self.get_by_value(value).await
    }
}

/// Owned handle for the dispatcher's maintenance sweep.
///
/// Separate from [`TokenRepository`] because the dispatcher outlives any
/// request scope and owns its pool handle.
#[derive(Clone)]
pub struct ExpiredTokenSweeper {
    pool: PgPool,
}

impl ExpiredTokenSweeper {
    /// Create a sweeper over the given pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenSweeper for ExpiredTokenSweeper {
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
