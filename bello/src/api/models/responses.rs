//! The JSON envelope every API response is wrapped in.
//!
//! Successful responses flatten their payload next to `"status": "success"`, errors carry a single
//! human-readable message next to `"status": "error"`:
//!
//! ```json
//! {"status": "success", "users": [], "total": 0}
//! {"status": "error", "message": "User not found"}
//! ```

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    auth::LoginPayload,
    users::{UserDetailsPayload, UserListPayload},
};

/// Response envelope, discriminated by the `status` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiResponse<T> {
    /// Payload fields are serialized inline next to the tag, so `T` must serialize as a map.
    Success(T),
    Error { message: String },
}

impl<T> ApiResponse<T> {
    pub fn success(payload: T) -> Self {
        Self::Success(payload)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Unwraps the success payload, if any.
    pub fn into_success(self) -> Option<T> {
        match self {
            Self::Success(payload) => Some(payload),
            Self::Error { .. } => None,
        }
    }
}

/// Payload for operations that only report a confirmation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MessagePayload {
    pub message: String,
}

impl MessagePayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Schema of the error envelope, used for OpenAPI documentation only.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Always `"error"`
    #[schema(example = "error")]
    pub status: String,
    pub message: String,
}

/// Declares a documentation-only schema for `{"status": "success", ...payload}`.
macro_rules! success_body {
    ($(#[$doc:meta])* $name:ident, $payload:ty) => {
        $(#[$doc])*
        #[derive(Debug, Serialize, ToSchema)]
        pub struct $name {
            /// Always `"success"`
            #[schema(example = "success")]
            pub status: String,
            #[serde(flatten)]
            pub payload: $payload,
        }
    };
}

success_body!(
    /// Success envelope of `GET /admin/users`
    UserListBody,
    UserListPayload
);
success_body!(
    /// Success envelope of `GET /admin/users/{user_id}`
    UserDetailsBody,
    UserDetailsPayload
);
success_body!(
    /// Success envelope carrying only a confirmation message
    MessageBody,
    MessagePayload
);
success_body!(LoginBody, LoginPayload);
