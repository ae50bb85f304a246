//! HTTP request handlers.
//!
//! - [`admin_users`]: Admin listing, inspection and deletion of user accounts
//! - [`auth`]: Login and logout
//!
//! Handlers return [`crate::errors::Error`] on failure, which renders as the standard error
//! envelope with the matching status code.

pub mod admin_users;
pub mod auth;
