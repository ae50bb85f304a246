//! API request/response models for login and logout.

use axum::{
    Json,
    extract::FromRequest,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    responses::{ApiResponse, MessagePayload},
    users::BasicInfo,
};
use crate::errors::Error;

/// Request body for `POST /login`. Malformed JSON is answered with the error envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRequest)]
#[from_request(via(Json), rejection(Error))]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Success payload for `POST /login`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginPayload {
    /// Session token, also usable as `Authorization: Bearer <token>`
    pub token: String,
    pub user: BasicInfo,
}

/// Structured response for successful login
pub struct LoginResponse {
    pub payload: LoginPayload,
    pub cookie: String,
}

/// Structured response for logout
pub struct LogoutResponse {
    pub payload: MessagePayload,
    pub cookie: String,
}

fn with_cookie<T: Serialize>(cookie: &str, body: ApiResponse<T>) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => (StatusCode::OK, [(header::SET_COOKIE, value)], Json(body)).into_response(),
        Err(e) => Error::Internal {
            operation: format!("build session cookie header: {e}"),
        }
        .into_response(),
    }
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        with_cookie(&self.cookie, ApiResponse::success(self.payload))
    }
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        with_cookie(&self.cookie, ApiResponse::success(self.payload))
    }
}
