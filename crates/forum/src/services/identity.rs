//! Per-request credential resolution.
//!
//! Every request gets exactly one identity decision, made from two
//! independently-trusted credential sources:
//!
//! 1. The session cookie, holding an opaque pointer to a server-issued
//!    [`SessionToken`]. Missing or expired sessions degrade to
//!    [`Identity::Anonymous`]; an expired session is also cleared as a
//!    side effect (logout-on-expiry).
//! 2. An `Authorization` header of the exact shape `email:key`, checked
//!    against the user's static API key. This path is consulted *only*
//!    when no session value exists - it is an alternative credential, not
//!    a second factor.
//!
//! A header credential that is present but malformed or wrong is rejected
//! outright: the caller asserted an identity and got it wrong, which is
//! not the same as offering no credential at all.

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use madrona_core::Email;

use crate::db::RepositoryError;
use crate::models::{SessionToken, User};

/// The resolved authentication outcome for one request.
///
/// Immutable once resolved; a request is never half-authenticated.
#[derive(Debug, Clone)]
pub enum Identity {
    /// No credential offered, or a session that has lapsed.
    Anonymous,
    /// A verified user.
    Authenticated(User),
}

impl Identity {
    /// The authenticated user, if any.
    #[must_use]
    pub fn into_user(self) -> Option<User> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }
}

/// Errors from identity resolution.
///
/// Absent or lapsed credentials are *not* errors; they resolve to
/// [`Identity::Anonymous`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// An API credential was offered and is malformed or wrong.
    #[error("invalid API credential")]
    InvalidApiCredential,

    /// A repository lookup failed for infrastructure reasons.
    #[error("repository error during identity resolution: {0}")]
    Repository(#[from] RepositoryError),
}

/// The slice of session storage the resolver needs: one string value.
///
/// Implemented by `tower_sessions::Session` for real requests and by an
/// in-memory fake in tests. Store read failures are treated as an absent
/// credential; clearing is best-effort.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// The session token value for the current request, if any.
    async fn session_token(&self) -> Option<String>;

    /// Remove the session token. Best-effort; used when a session has
    /// expired out from under the client.
    async fn clear_session_token(&self);
}

/// Lookup of persisted session tokens by their opaque value.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find a session token by its bearer value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup fails for infrastructure
    /// reasons. Not-found is `Ok(None)`.
    async fn find_by_value(&self, value: &str) -> Result<Option<SessionToken>, RepositoryError>;
}

/// Lookup of users by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find a user by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup fails for infrastructure
    /// reasons. Not-found is `Ok(None)`.
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;
}

/// Resolve the identity for one request.
///
/// The session path runs first; the API-key path is only reached when the
/// session store has no value for this request. Exactly one of
/// `Authenticated`, `Anonymous`, or an error comes out.
///
/// # Side effects
///
/// An expired or unknown session token is cleared from the session store
/// before resolving `Anonymous`. Callers must tolerate this write on a
/// read path.
///
/// # Errors
///
/// - [`ResolveError::InvalidApiCredential`] for a present-but-wrong API
///   credential (malformed shape, unknown email, or key mismatch).
/// - [`ResolveError::Repository`] when a store lookup fails, or when a
///   live token points at a user that no longer exists.
pub async fn resolve_identity<C, T, U>(
    credentials: &C,
    api_header: Option<&str>,
    tokens: &T,
    users: &U,
) -> Result<Identity, ResolveError>
where
    C: CredentialSource + ?Sized,
    T: TokenStore + ?Sized,
    U: UserStore + ?Sized,
{
    if let Some(value) = credentials.session_token().await {
        return resolve_session(credentials, &value, tokens, users).await;
    }

    let Some(raw) = api_header else {
        return Ok(Identity::Anonymous);
    };
    resolve_api_credential(raw, users).await
}

/// Session-token path: the token value points at a persisted token.
async fn resolve_session<C, T, U>(
    credentials: &C,
    value: &str,
    tokens: &T,
    users: &U,
) -> Result<Identity, ResolveError>
where
    C: CredentialSource + ?Sized,
    T: TokenStore + ?Sized,
    U: UserStore + ?Sized,
{
    let token = match tokens.find_by_value(value).await? {
        Some(token) if !token.is_expired(Utc::now()) => token,
        _ => {
            // Unknown or expired token: clear the stale pointer and
            // continue as a guest. This is a full reset, not an error.
            debug!("session token lapsed, clearing session");
            credentials.clear_session_token().await;
            return Ok(Identity::Anonymous);
        }
    };

    let user = users.find_by_email(&token.email).await?.ok_or_else(|| {
        RepositoryError::DataCorruption(format!("no user behind live session token {}", token.id))
    })?;

    Ok(Identity::Authenticated(user))
}

/// API-key path: a header credential of the exact shape `email:key`.
async fn resolve_api_credential<U>(raw: &str, users: &U) -> Result<Identity, ResolveError>
where
    U: UserStore + ?Sized,
{
    let (email, key) = parse_api_credential(raw).ok_or(ResolveError::InvalidApiCredential)?;
    let email = Email::parse(email).map_err(|_| ResolveError::InvalidApiCredential)?;

    let user = users
        .find_by_email(&email)
        .await?
        .ok_or(ResolveError::InvalidApiCredential)?;

    if user.api_key != key {
        return Err(ResolveError::InvalidApiCredential);
    }

    Ok(Identity::Authenticated(user))
}

/// Split a header credential into `(email, key)`.
///
/// Exactly two non-empty colon-separated fields; anything else (no colon,
/// extra colons, empty fields) is malformed and returns `None`.
fn parse_api_credential(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(email), Some(key), None) if !email.is_empty() && !key.is_empty() => {
            Some((email, key))
        }
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::{Duration, Utc};

    use madrona_core::UserId;

    use super::*;

    // =========================================================================
    // Fakes
    // =========================================================================

    struct FakeCredentials {
        token: Mutex<Option<String>>,
    }

    impl FakeCredentials {
        fn with_token(value: &str) -> Self {
            Self {
                token: Mutex::new(Some(value.to_string())),
            }
        }

        fn empty() -> Self {
            Self {
                token: Mutex::new(None),
            }
        }

        fn stored(&self) -> Option<String> {
            self.token.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CredentialSource for FakeCredentials {
        async fn session_token(&self) -> Option<String> {
            self.token.lock().unwrap().clone()
        }

        async fn clear_session_token(&self) {
            *self.token.lock().unwrap() = None;
        }
    }

    #[derive(Default)]
    struct FakeTokens {
        by_value: HashMap<String, SessionToken>,
    }

    impl FakeTokens {
        fn with(token: SessionToken) -> Self {
            let mut by_value = HashMap::new();
            by_value.insert(token.value.clone(), token);
            Self { by_value }
        }
    }

    #[async_trait]
    impl TokenStore for FakeTokens {
        async fn find_by_value(
            &self,
            value: &str,
        ) -> Result<Option<SessionToken>, RepositoryError> {
            Ok(self.by_value.get(value).cloned())
        }
    }

    #[derive(Default)]
    struct FakeUsers {
        by_email: HashMap<String, User>,
        fail: bool,
    }

    impl FakeUsers {
        fn with(user: User) -> Self {
            let mut by_email = HashMap::new();
            by_email.insert(user.email.as_str().to_string(), user);
            Self {
                by_email,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                by_email: HashMap::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl UserStore for FakeUsers {
        async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
            if self.fail {
                return Err(RepositoryError::Database(sqlx::Error::PoolClosed));
            }
            Ok(self.by_email.get(email.as_str()).cloned())
        }
    }

    fn test_user(email: &str, api_key: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId::generate(),
            email: Email::parse(email).unwrap(),
            handle: "reader".to_string(),
            api_key: api_key.to_string(),
            admin: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn live_token_for(user: &User) -> SessionToken {
        SessionToken::issue(
            user.id,
            user.email.clone(),
            user.handle.clone(),
            Duration::hours(24),
        )
    }

    fn expired_token_for(user: &User) -> SessionToken {
        let mut token = live_token_for(user);
        token.expires_at = Utc::now() - Duration::hours(1);
        token
    }

    // =========================================================================
    // Anonymous outcomes
    // =========================================================================

    #[tokio::test]
    async fn no_credentials_resolves_anonymous() {
        let credentials = FakeCredentials::empty();
        let identity = resolve_identity(
            &credentials,
            None,
            &FakeTokens::default(),
            &FakeUsers::default(),
        )
        .await
        .unwrap();

        assert!(matches!(identity, Identity::Anonymous));
    }

    #[tokio::test]
    async fn expired_token_resolves_anonymous_and_clears_session() {
        let user = test_user("reader@example.com", "key");
        let token = expired_token_for(&user);
        let credentials = FakeCredentials::with_token(&token.value);

        let identity = resolve_identity(
            &credentials,
            None,
            &FakeTokens::with(token),
            &FakeUsers::with(user),
        )
        .await
        .unwrap();

        assert!(matches!(identity, Identity::Anonymous));
        // Side effect: the stale session pointer is gone.
        assert_eq!(credentials.stored(), None);
    }

    #[tokio::test]
    async fn unknown_token_resolves_anonymous_and_clears_session() {
        let credentials = FakeCredentials::with_token("no-such-token");

        let identity = resolve_identity(
            &credentials,
            None,
            &FakeTokens::default(),
            &FakeUsers::default(),
        )
        .await
        .unwrap();

        assert!(matches!(identity, Identity::Anonymous));
        assert_eq!(credentials.stored(), None);
    }

    // =========================================================================
    // Session-token path
    // =========================================================================

    #[tokio::test]
    async fn live_token_resolves_authenticated() {
        let user = test_user("reader@example.com", "key");
        let token = live_token_for(&user);
        let credentials = FakeCredentials::with_token(&token.value);

        let identity = resolve_identity(
            &credentials,
            None,
            &FakeTokens::with(token),
            &FakeUsers::with(user.clone()),
        )
        .await
        .unwrap();

        match identity {
            Identity::Authenticated(resolved) => assert_eq!(resolved.id, user.id),
            Identity::Anonymous => panic!("expected authenticated identity"),
        }
        // The live session value stays put.
        assert!(credentials.stored().is_some());
    }

    #[tokio::test]
    async fn session_wins_over_api_header() {
        // With a live session value, the API header is never consulted -
        // even a garbage header cannot cause a rejection.
        let user = test_user("reader@example.com", "key");
        let token = live_token_for(&user);
        let credentials = FakeCredentials::with_token(&token.value);

        let identity = resolve_identity(
            &credentials,
            Some("complete:garbage:header"),
            &FakeTokens::with(token),
            &FakeUsers::with(user),
        )
        .await
        .unwrap();

        assert!(matches!(identity, Identity::Authenticated(_)));
    }

    #[tokio::test]
    async fn missing_user_behind_live_token_is_an_error() {
        let user = test_user("reader@example.com", "key");
        let token = live_token_for(&user);
        let credentials = FakeCredentials::with_token(&token.value);

        // Token exists, user record does not.
        let result = resolve_identity(
            &credentials,
            None,
            &FakeTokens::with(token),
            &FakeUsers::default(),
        )
        .await;

        assert!(matches!(
            result,
            Err(ResolveError::Repository(RepositoryError::DataCorruption(_)))
        ));
    }

    #[tokio::test]
    async fn user_lookup_failure_on_session_path_is_an_error() {
        let user = test_user("reader@example.com", "key");
        let token = live_token_for(&user);
        let credentials = FakeCredentials::with_token(&token.value);

        let result = resolve_identity(
            &credentials,
            None,
            &FakeTokens::with(token),
            &FakeUsers::failing(),
        )
        .await;

        // Infrastructure failure surfaces; it must not degrade to anonymous.
        assert!(matches!(result, Err(ResolveError::Repository(_))));
    }

    // =========================================================================
    // API-key path
    // =========================================================================

    #[tokio::test]
    async fn matching_api_key_resolves_authenticated() {
        let user = test_user("reader@example.com", "the-key");
        let credentials = FakeCredentials::empty();

        let identity = resolve_identity(
            &credentials,
            Some("reader@example.com:the-key"),
            &FakeTokens::default(),
            &FakeUsers::with(user.clone()),
        )
        .await
        .unwrap();

        match identity {
            Identity::Authenticated(resolved) => assert_eq!(resolved.id, user.id),
            Identity::Anonymous => panic!("expected authenticated identity"),
        }
    }

    #[tokio::test]
    async fn wrong_api_key_is_rejected_not_anonymous() {
        let user = test_user("reader@example.com", "right-key");

        let result = resolve_identity(
            &FakeCredentials::empty(),
            Some("reader@example.com:wrong-key"),
            &FakeTokens::default(),
            &FakeUsers::with(user),
        )
        .await;

        assert!(matches!(result, Err(ResolveError::InvalidApiCredential)));
    }

    #[tokio::test]
    async fn unknown_email_on_api_path_is_rejected() {
        let result = resolve_identity(
            &FakeCredentials::empty(),
            Some("nobody@example.com:key"),
            &FakeTokens::default(),
            &FakeUsers::default(),
        )
        .await;

        assert!(matches!(result, Err(ResolveError::InvalidApiCredential)));
    }

    #[tokio::test]
    async fn malformed_api_header_is_rejected() {
        // Present-but-malformed is a rejection, distinct from absent.
        for header in ["no-colon", "a:b:c", ":key-only", "email-only:", ":"] {
            let result = resolve_identity(
                &FakeCredentials::empty(),
                Some(header),
                &FakeTokens::default(),
                &FakeUsers::default(),
            )
            .await;

            assert!(
                matches!(result, Err(ResolveError::InvalidApiCredential)),
                "header {header:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn api_path_lookup_failure_is_an_infrastructure_error() {
        let result = resolve_identity(
            &FakeCredentials::empty(),
            Some("reader@example.com:key"),
            &FakeTokens::default(),
            &FakeUsers::failing(),
        )
        .await;

        assert!(matches!(result, Err(ResolveError::Repository(_))));
    }

    // =========================================================================
    // Credential parsing
    // =========================================================================

    #[test]
    fn parse_accepts_exactly_two_fields() {
        assert_eq!(
            parse_api_credential("a@b.com:key"),
            Some(("a@b.com", "key"))
        );
    }

    #[test]
    fn parse_rejects_other_shapes() {
        assert_eq!(parse_api_credential("nocolon"), None);
        assert_eq!(parse_api_credential("a:b:c"), None);
        assert_eq!(parse_api_credential(":key"), None);
        assert_eq!(parse_api_credential("email:"), None);
        assert_eq!(parse_api_credential(""), None);
    }
}
