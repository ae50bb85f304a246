//! Authentication and authorization.
//!
//! Callers authenticate with a signed session token (JWT) issued by `POST /api/login`. The token
//! is accepted from two places:
//!
//! - the `Authorization: Bearer <token>` header, for programmatic clients;
//! - the session cookie (`auth.cookie_name`, HTTP-only), for the browser frontend.
//!
//! Admin routes are guarded by [`middleware::require_admin`], which resolves the caller into an
//! [`AuthContext`](crate::api::models::users::AuthContext) and rejects non-admins with 403.
//! Handlers read the context back with the `AuthContext` extractor:
//!
//! ```ignore
//! async fn handler(current: AuthContext) -> String {
//!     format!("Hello, {}!", current.username)
//! }
//! ```
//!
//! # Modules
//!
//! - [`current_user`]: Token discovery and the `AuthContext` extractor
//! - [`middleware`]: Route protection middleware
//! - [`password`]: Password hashing and verification using Argon2
//! - [`session`]: Session token (JWT) creation and verification

pub mod current_user;
pub mod middleware;
pub mod password;
pub mod session;
