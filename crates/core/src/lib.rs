//! Madrona Core - Shared types library.
//!
//! This crate provides the common types used by the forum server:
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no
//! HTTP. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and validated emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
