//! HTTP API: route handlers and their JSON models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request and response shapes, kept apart from the database models
//!
//! Routes are mounted under `/api`. The OpenAPI document is served at `/api/openapi.json` and
//! rendered at `/api/docs`.

pub mod handlers;
pub mod models;
