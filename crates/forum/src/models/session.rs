//! Session-related constants.
//!
//! The session stores a single pointer: the opaque value of the user's
//! current [`SessionToken`](crate::models::SessionToken). Everything else
//! about the user is looked up per request.

/// Session keys for authentication data.
pub mod keys {
    /// Key under which the session token value is stored.
    pub const SESSION_TOKEN: &str = "token";
}
