//! Application services.
//!
//! - [`auth`] - registration, login, logout
//! - [`identity`] - per-request credential resolution
//! - [`notifications`] - the notification queue and its dispatcher

pub mod auth;
pub mod identity;
pub mod notifications;
