use axum::extract::State;
use tracing::{info, warn};

use crate::{
    AppState,
    api::models::{
        auth::{LoginPayload, LoginRequest, LoginResponse, LogoutResponse},
        responses::{ErrorBody, LoginBody, MessageBody, MessagePayload},
        users::{AuthContext, BasicInfo},
    },
    auth::{password, session},
    config::Config,
    errors::Error,
};

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid username or password".to_string()),
    }
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful; the session cookie is set as well", body = LoginBody),
        (status = 400, description = "Malformed request body", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    )
)]
#[tracing::instrument(skip_all, fields(username = %request.username))]
pub async fn login(State(state): State<AppState>, request: LoginRequest) -> Result<LoginResponse, Error> {
    let user = state
        .users
        .get_user_by_username(&request.username)
        .await?
        .ok_or_else(invalid_credentials)?;

    // Accounts without a password cannot log in
    let hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;

    // Verify password on a blocking thread to avoid blocking async runtime
    let password = request.password;
    let is_valid = tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(invalid_credentials());
    }

    if let Err(e) = state.users.record_login(user.id).await {
        warn!("Failed to record login for user {}: {}", user.id, e);
    }

    let current_user = AuthContext::from(&user);
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = session_cookie(&token, &state.config);

    info!("User {} logged in", user.id);
    Ok(LoginResponse {
        payload: LoginPayload {
            token,
            user: BasicInfo::from(user),
        },
        cookie,
    })
}

/// Logout (clear session cookie)
#[utoipa::path(
    post,
    path = "/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = MessageBody),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> LogoutResponse {
    LogoutResponse {
        payload: MessagePayload::new("Logged out"),
        cookie: expired_cookie(&state.config),
    }
}

fn cookie_attributes(config: &Config) -> &'static str {
    if config.auth.cookie_secure {
        "Path=/; HttpOnly; SameSite=Lax; Secure"
    } else {
        "Path=/; HttpOnly; SameSite=Lax"
    }
}

fn session_cookie(token: &str, config: &Config) -> String {
    format!(
        "{}={}; {}; Max-Age={}",
        config.auth.cookie_name,
        token,
        cookie_attributes(config),
        config.auth.jwt_expiry.as_secs()
    )
}

fn expired_cookie(config: &Config) -> String {
    format!("{}=; {}; Max-Age=0", config.auth.cookie_name, cookie_attributes(config))
}
