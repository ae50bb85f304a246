//! Database record structures returned and accepted by the repositories.

pub mod users;
