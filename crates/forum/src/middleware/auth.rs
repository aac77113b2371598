//! Authentication middleware and extractors.
//!
//! Provides extractors that run the credential resolver once per request
//! and hand handlers a typed identity instead of a dynamically-keyed
//! context value.

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{error, warn};

use crate::db::tokens::TokenRepository;
use crate::db::users::UserRepository;
use crate::models::{User, session_keys};
use crate::services::identity::{CredentialSource, Identity, ResolveError, resolve_identity};
use crate::state::AppState;

/// Extractor that requires an authenticated user.
///
/// Anonymous HTML requests are redirected to the login page; anonymous
/// API requests get 401. A present-but-invalid API credential is 401 on
/// both.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireUser(user): RequireUser,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.handle)
/// }
/// ```
pub struct RequireUser(pub User);

/// Extractor that resolves the identity without requiring one.
///
/// Absent or lapsed credentials yield `None`; a present-but-invalid API
/// credential is still rejected (the caller asserted a wrong identity).
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(
///     OptionalUser(user): OptionalUser,
/// ) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}!", u.handle),
///         None => "Hello, guest!".to_string(),
///     }
/// }
/// ```
pub struct OptionalUser(pub Option<User>);

/// Error returned when identity resolution fails or auth is required.
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (API requests, or a bad API credential).
    Unauthorized,
    /// Resolution failed for infrastructure reasons.
    Internal,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for OptionalUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let identity = resolve(parts, &app).await?;
        Ok(Self(identity.into_user()))
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let is_api = parts.uri.path().starts_with("/api/");

        match resolve(parts, &app).await? {
            Identity::Authenticated(user) => Ok(Self(user)),
            Identity::Anonymous => Err(if is_api {
                AuthRejection::Unauthorized
            } else {
                AuthRejection::RedirectToLogin
            }),
        }
    }
}

/// Run the resolver for this request.
async fn resolve(parts: &mut Parts, app: &AppState) -> Result<Identity, AuthRejection> {
    // Set by SessionManagerLayer; absence is a wiring bug, not a guest.
    let session = parts.extensions.get::<Session>().cloned().ok_or_else(|| {
        error!("session layer missing from request extensions");
        AuthRejection::Internal
    })?;

    let api_header = match parts.headers.get(AUTHORIZATION) {
        None => None,
        Some(value) => match value.to_str() {
            Ok("") => None,
            Ok(raw) => Some(raw),
            // A credential was offered and cannot even be read.
            Err(_) => return Err(AuthRejection::Unauthorized),
        },
    };

    let users = UserRepository::new(app.pool());
    let tokens = TokenRepository::new(app.pool());

    resolve_identity(&session, api_header, &tokens, &users)
        .await
        .map_err(|e| match e {
            ResolveError::InvalidApiCredential => AuthRejection::Unauthorized,
            ResolveError::Repository(err) => {
                error!(error = %err, "identity resolution failed");
                AuthRejection::Internal
            }
        })
}

#[async_trait]
impl CredentialSource for Session {
    async fn session_token(&self) -> Option<String> {
        match self.get::<String>(session_keys::SESSION_TOKEN).await {
            Ok(value) => value,
            Err(e) => {
                // A broken session store reads as "no session offered".
                warn!(error = %e, "failed to read session token");
                None
            }
        }
    }

    async fn clear_session_token(&self) {
        if let Err(e) = self.remove::<String>(session_keys::SESSION_TOKEN).await {
            warn!(error = %e, "failed to clear lapsed session token");
        }
    }
}

/// Store the session-token pointer after login.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn store_session_token(
    session: &Session,
    token_value: &str,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::SESSION_TOKEN, token_value.to_owned())
        .await
}

/// Clear the session-token pointer (logout).
///
/// The token row itself is left for the maintenance sweep.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_session(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<String>(session_keys::SESSION_TOKEN)
        .await?;
    Ok(())
}
