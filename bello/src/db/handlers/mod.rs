//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection (or transaction, which derefs to one) and exposes
//! strongly-typed operations that return models from [`crate::db::models`].
//!
//! ```ignore
//! use bello::db::handlers::{Repository, Users};
//!
//! let mut conn = pool.acquire().await?;
//! let mut users = Users::new(&mut conn);
//! let alice = users.get_user_by_username("alice").await?;
//! ```

pub mod repository;
pub mod users;

pub use repository::Repository;
pub use users::{UserFilter, Users};
