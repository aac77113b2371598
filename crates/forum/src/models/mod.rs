//! Domain types for the forum.
//!
//! These types represent validated domain objects separate from database
//! row types.

pub mod notification;
pub mod session;
pub mod token;
pub mod topic;
pub mod user;

pub use notification::Notification;
pub use session::keys as session_keys;
pub use token::SessionToken;
pub use topic::{Post, Topic};
pub use user::User;
