//! Database operations for the forum `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `users` - Accounts, API keys, and password hashes
//! - `tokens` - Session tokens issued at login
//! - `topics` / `posts` - Forum content
//! - `notifications` - One row per notification (see `notifications.rs`
//!   for why this is not an array on the user row)
//! - `tower_sessions.session` - Session store (managed by
//!   tower-sessions-sqlx-store)
//!
//! # Migrations
//!
//! Migrations are embedded from `crates/forum/migrations/` and run at
//! startup.

pub mod notifications;
pub mod tokens;
pub mod topics;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
