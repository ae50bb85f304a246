//! Admin user management: listing, detail retrieval and deletion.
//!
//! Every route sits behind [`require_admin`](crate::auth::middleware::require_admin) and answers
//! `OPTIONS` with an empty 204 before any authorization runs.

use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::{
    AppState,
    api::models::{
        pagination::ListUsersQuery,
        responses::{ApiResponse, ErrorBody, MessageBody, MessagePayload, UserDetailsBody, UserListBody},
        users::{AuthContext, BasicInfo, ProfileInfo, UserDetailsPayload, UserListPayload},
    },
    db::handlers::UserFilter,
    errors::{Error, Result},
    types::UserId,
};

/// `{user_id}` path segment. Non-numeric ids are rejected with the error envelope.
#[derive(Debug, Deserialize, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct UserPath(pub UserId);

fn user_not_found(id: UserId) -> Error {
    Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    }
}

/// List users
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "admin",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "One page of users", body = UserListBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[instrument(skip_all, fields(page = query.page(), limit = query.limit()))]
pub async fn list_users(State(state): State<AppState>, query: ListUsersQuery) -> Result<Json<ApiResponse<UserListPayload>>> {
    let mut filter = UserFilter::new(query.offset(), query.limit());
    if let Some(search) = query.search() {
        filter = filter.with_search(search);
    }

    let (users, total) = state.users.list_users(&filter).await?;

    Ok(Json(ApiResponse::success(UserListPayload {
        users: users.into_iter().map(BasicInfo::from).collect(),
        total,
    })))
}

/// Get a user's account and profile
#[utoipa::path(
    get,
    path = "/admin/users/{user_id}",
    tag = "admin",
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account and profile; `profile_info` is null when the user has no profile", body = UserDetailsBody),
        (status = 400, description = "Malformed user id", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 500, description = "Storage failure", body = ErrorBody),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[instrument(skip(state))]
pub async fn get_user_details(State(state): State<AppState>, UserPath(user_id): UserPath) -> Result<Json<ApiResponse<UserDetailsPayload>>> {
    let basic_info = state.users.get_user(user_id).await?.ok_or_else(|| user_not_found(user_id))?;
    let profile_info = state.users.get_profile(user_id).await?;

    Ok(Json(ApiResponse::success(UserDetailsPayload {
        basic_info: basic_info.into(),
        profile_info: profile_info.map(ProfileInfo::from),
    })))
}

/// Delete a user
///
/// Removes the account together with its profile, meetings, participation records and chat
/// messages. Admins cannot delete their own account.
#[utoipa::path(
    delete,
    path = "/admin/users/{user_id}",
    tag = "admin",
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = MessageBody),
        (status = 400, description = "Attempt to delete own account, or malformed user id", body = ErrorBody),
        (status = 401, description = "Missing or invalid session", body = ErrorBody),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
        (status = 404, description = "User not found", body = ErrorBody),
        (status = 500, description = "Deletion failed", body = ErrorBody),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[instrument(skip(state, current), fields(admin_id = current.user_id))]
pub async fn delete_user(
    State(state): State<AppState>,
    current: AuthContext,
    UserPath(user_id): UserPath,
) -> Result<Json<ApiResponse<MessagePayload>>> {
    // Checked before the lookup so that self-deletion is refused whether or not the row exists
    if user_id == current.user_id {
        return Err(Error::BadRequest {
            message: "Cannot delete your own account".to_string(),
        });
    }

    state.users.get_user(user_id).await?.ok_or_else(|| user_not_found(user_id))?;

    if !state.users.delete_user(user_id).await? {
        return Err(Error::OperationFailed {
            operation: "delete user".to_string(),
        });
    }

    info!("Admin {} deleted user {}", current.user_id, user_id);
    Ok(Json(ApiResponse::success(MessagePayload::new("User deleted successfully"))))
}

/// CORS preflight for the admin user routes
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}
