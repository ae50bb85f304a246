//! Identifier aliases shared across the API and database layers.

/// Primary key of the `users` table.
pub type UserId = i64;
