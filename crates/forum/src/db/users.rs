//! User repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use async_trait::async_trait;
use madrona_core::{Email, UserId};

use super::RepositoryError;
use crate::models::User;
use crate::services::identity::UserStore;

/// Database row for a user, before domain validation.
#[derive(Debug, sqlx::FromRow)]
struct DbUser {
    id: Uuid,
    email: String,
    handle: String,
    api_key: String,
    admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DbUser {
    fn into_user(self) -> Result<User, RepositoryError> {
        let email = Email::parse(&self.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(User {
            id: UserId::new(self.id),
            email,
            handle: self.handle,
            api_key: self.api_key,
            admin: self.admin,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row for the login path: user plus password hash.
#[derive(Debug, sqlx::FromRow)]
struct DbLoginRow {
    id: Uuid,
    email: String,
    handle: String,
    api_key: String,
    admin: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    password_hash: String,
}

/// Parameters for creating a user.
pub struct CreateUser {
    /// Validated email address.
    pub email: Email,
    /// Display handle.
    pub handle: String,
    /// Generated static API key.
    pub api_key: String,
    /// Argon2 password hash.
    pub password_hash: String,
    /// Admin flag.
    pub admin: bool,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, DbUser>(
            r"
            SELECT id, email, handle, api_key, admin, created_at, updated_at
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(DbUser::into_user).transpose()
    }

    /// Get a user and their password hash by email, for login.
    ///
    /// Returns `None` if no such account exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_for_login(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query_as::<_, DbLoginRow>(
            r"
            SELECT id, email, handle, api_key, admin, created_at, updated_at, password_hash
            FROM users
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let password_hash = r.password_hash.clone();
        let user = DbUser {
            id: r.id,
            email: r.email,
            handle: r.handle,
            api_key: r.api_key,
            admin: r.admin,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
        .into_user()?;

        Ok(Some((user, password_hash)))
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, params: CreateUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, DbUser>(
            r"
            INSERT INTO users (id, email, handle, api_key, password_hash, admin)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, handle, api_key, admin, created_at, updated_at
            ",
        )
        .bind(UserId::generate().as_uuid())
        .bind(params.email.as_str())
        .bind(&params.handle)
        .bind(&params.api_key)
        .bind(&params.password_hash)
        .bind(params.admin)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("email already exists".to_owned());
            }
            RepositoryError::Database(e)
        })?;

        row.into_user()
    }
}

#[async_trait]
impl UserStore for UserRepository<'_> {
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.get_by_email(email).await
    }
}
