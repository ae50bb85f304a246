//! Database models for users and their profiles.

use crate::types::UserId;
use chrono::{DateTime, NaiveDate, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub password_hash: Option<String>,
}

/// Database request for updating a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub password_hash: Option<String>,
}

/// Database response for a user
#[derive(Debug, Clone)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Insert-or-replace request for a user's profile
#[derive(Debug, Clone, Default)]
pub struct ProfileUpsertDBRequest {
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

/// Database response for a user's profile
#[derive(Debug, Clone)]
pub struct ProfileDBResponse {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}
