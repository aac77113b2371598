//! Authentication service.
//!
//! Registration, password login, and session-token issuance. Password
//! verification is the only place hashes are touched; resolved identities
//! never carry them.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Duration;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;

use madrona_core::{Email, EmailError};

use crate::db::RepositoryError;
use crate::db::tokens::TokenRepository;
use crate::db::users::{CreateUser, UserRepository};
use crate::models::token::SESSION_TOKEN_TTL_HOURS;
use crate::models::{SessionToken, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Errors from authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email/password pair does not match an account.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password does not meet requirements.
    #[error("weak password: {0}")]
    WeakPassword(String),

    /// Email failed validation.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password hashing or parsing failed.
    #[error("password hash error: {0}")]
    PasswordHash(String),

    /// Underlying repository failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Authentication service.
///
/// Handles registration, login, and session-token issuance.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    tokens: TokenRepository<'a>,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            users: UserRepository::new(pool),
            tokens: TokenRepository::new(pool),
        }
    }

    /// Register a new user.
    ///
    /// Generates the user's static API key; the returned user carries it,
    /// and registration is the only time a caller learns it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        handle: &str,
        admin: bool,
    ) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;
        let api_key = generate_api_key();

        let user = self
            .users
            .create(CreateUser {
                email,
                handle: handle.to_owned(),
                api_key,
                password_hash,
                admin,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        Ok(user)
    }

    /// Login with email and password, issuing a session token.
    ///
    /// The caller stores the token's `value` in the session; the token
    /// row is persisted here.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(User, SessionToken), AuthError> {
        let email = Email::parse(email)?;

        let (user, password_hash) = self
            .users
            .find_for_login(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        let token = SessionToken::issue(
            user.id,
            user.email.clone(),
            user.handle.clone(),
            Duration::hours(SESSION_TOKEN_TTL_HOURS),
        );
        self.tokens.save(&token).await?;

        Ok((user, token))
    }
}

// =============================================================================
// Password hashing
// =============================================================================

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password with argon2 and a fresh salt.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// A mismatch is `InvalidCredentials`; an unparseable stored hash is a
/// `PasswordHash` error (corrupt data, not a wrong password).
fn verify_password(password: &str, stored_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AuthError::PasswordHash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

/// Generate a user's static API key: 32 random bytes, SHA-256, base64.
fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    BASE64.encode(Sha256::digest(bytes))
}
