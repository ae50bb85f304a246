//! API request/response models for users.

use crate::db::models::users::{ProfileDBResponse, UserDBResponse};
use crate::types::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The authenticated caller of a request, derived from a verified session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthContext {
    pub user_id: UserId,
    pub username: String,
    pub is_admin: bool,
}

/// Minimal identifying record of a user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BasicInfo {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Extended, optional profile data. Every field may be unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProfileInfo {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One page of the user directory.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserListPayload {
    pub users: Vec<BasicInfo>,
    /// Number of users matching the search, across all pages
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDetailsPayload {
    pub basic_info: BasicInfo,
    /// `null` when the user never created a profile
    pub profile_info: Option<ProfileInfo>,
}

impl From<UserDBResponse> for BasicInfo {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            is_admin: db.is_admin,
            created_at: db.created_at,
            last_login: db.last_login,
        }
    }
}

impl From<ProfileDBResponse> for ProfileInfo {
    fn from(db: ProfileDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            display_name: db.display_name,
            gender: db.gender,
            birthday: db.birthday,
            bio: db.bio,
            avatar_url: db.avatar_url,
            updated_at: db.updated_at,
        }
    }
}

impl From<&UserDBResponse> for AuthContext {
    fn from(user: &UserDBResponse) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_info_never_exposes_password_hash() {
        let now = Utc::now();
        let db = UserDBResponse {
            id: 3,
            username: "zoe".to_string(),
            email: "zoe@example.com".to_string(),
            is_admin: false,
            password_hash: Some("$argon2id$secret".to_string()),
            created_at: now,
            updated_at: now,
            last_login: None,
        };

        let json = serde_json::to_value(BasicInfo::from(db)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "zoe");
        assert!(json["last_login"].is_null());
    }
}
