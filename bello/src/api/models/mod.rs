//! API request and response data models.
//!
//! These types define the JSON shapes of the HTTP API. They are kept separate from the database
//! models in [`crate::db::models`]; conversions live next to the API types.

pub mod auth;
pub mod pagination;
pub mod responses;
pub mod users;
