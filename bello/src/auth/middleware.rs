use crate::{
    AppState,
    api::models::users::AuthContext,
    auth::current_user::authenticate,
    config::Config,
    errors::Error,
};
use axum::{
    extract::{Request, State},
    http::{Method, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Implementation for require_admin: the caller must hold a valid session for an admin account.
pub(crate) fn authorize_admin(parts: &Parts, config: &Config) -> Result<AuthContext, Error> {
    let user = authenticate(parts, config)?;
    if !user.is_admin {
        return Err(Error::Forbidden { message: None });
    }
    Ok(user)
}

/// Guards admin routes. Preflight requests pass straight through so browsers can negotiate CORS
/// before they hold credentials; everything else must be authorized, and the resolved
/// [`AuthContext`] is stored in the request extensions for the handler.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let user = authorize_admin(&parts, &state.config)?;
    debug!("Admin {} authorized for {} {}", user.user_id, parts.method, parts.uri.path());
    parts.extensions.insert(user);

    Ok(next.run(Request::from_parts(parts, body)).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_config, create_test_state, token_for};
    use axum::{Extension, Json, Router, http::StatusCode, middleware::from_fn_with_state, routing::get};
    use axum_test::TestServer;

    fn parts_with_token(token: &str) -> Parts {
        axum::http::Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_authorize_admin_accepts_admins() {
        let config = create_test_config();
        let user = authorize_admin(&parts_with_token(&token_for(&config, 1, true)), &config).unwrap();
        assert_eq!(user.user_id, 1);
    }

    #[test]
    fn test_authorize_admin_rejects_regular_users() {
        let config = create_test_config();
        let result = authorize_admin(&parts_with_token(&token_for(&config, 2, false)), &config);
        assert!(matches!(result, Err(Error::Forbidden { .. })));
    }

    fn guarded_server() -> TestServer {
        let state = create_test_state(Default::default());
        async fn whoami(Extension(user): Extension<AuthContext>) -> Json<AuthContext> {
            Json(user)
        }
        let app = Router::new()
            .route("/guarded", get(whoami).options(|| async { StatusCode::NO_CONTENT }))
            .route_layer(from_fn_with_state(state.clone(), require_admin))
            .with_state(state);
        TestServer::new(app).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_options_skips_authorization() {
        let server = guarded_server();
        let response = server.method(Method::OPTIONS, "/guarded").await;
        response.assert_status(StatusCode::NO_CONTENT);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_token_is_rejected_with_envelope() {
        let server = guarded_server();
        let response = server.get("/guarded").await;
        response.assert_status_unauthorized();
        response.assert_json(&serde_json::json!({"status": "error", "message": "Authentication required"}));
    }

    #[test_log::test(tokio::test)]
    async fn test_context_reaches_handler() {
        let server = guarded_server();
        let token = token_for(&create_test_config(), 9, true);
        let response = server.get("/guarded").add_header("authorization", format!("Bearer {token}")).await;
        response.assert_status_ok();

        let user: AuthContext = response.json();
        assert_eq!(user.user_id, 9);
    }
}
