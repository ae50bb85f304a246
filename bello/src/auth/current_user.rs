use crate::{
    AppState,
    api::models::users::AuthContext,
    auth::session,
    config::Config,
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Session tokens carried by the request, in the order they should be tried: the
/// `Authorization: Bearer` header first, then every cookie with the session cookie name.
fn candidate_tokens<'a>(parts: &'a Parts, cookie_name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let cookies = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(move |cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == cookie_name).then_some(value)
        });

    bearer.into_iter().chain(cookies)
}

/// Authenticate the request from its session token.
///
/// Every candidate token is tried and the first valid one wins, so a stale cookie does not shadow
/// a fresh bearer token or vice versa. Rejected tokens are not errors on their own; only when no
/// token verifies is the request unauthenticated.
#[instrument(skip_all)]
pub fn authenticate(parts: &Parts, config: &Config) -> Result<AuthContext> {
    let mut attempts = 0;
    for token in candidate_tokens(parts, &config.auth.cookie_name) {
        attempts += 1;
        match session::verify_session_token(token, config) {
            Ok(user) => {
                debug!("Found session authenticated user: {}", user.user_id);
                return Ok(user);
            }
            Err(Error::Unauthenticated { .. }) => {
                trace!("Session token rejected");
            }
            Err(e) => return Err(e),
        }
    }

    trace!("No valid session token among {} candidates", attempts);
    Err(Error::Unauthenticated { message: None })
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Already resolved by the admin middleware
        if let Some(user) = parts.extensions.get::<AuthContext>() {
            return Ok(user.clone());
        }
        authenticate(parts, &state.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_config, token_for};
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/admin/users");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_missing_credentials_is_unauthenticated() {
        let config = create_test_config();
        let result = authenticate(&parts(&[]), &config);
        assert!(matches!(result, Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_bearer_token() {
        let config = create_test_config();
        let token = token_for(&config, 5, true);
        let bearer = format!("Bearer {token}");

        let user = authenticate(&parts(&[("authorization", &bearer)]), &config).unwrap();
        assert_eq!(user.user_id, 5);
        assert!(user.is_admin);
    }

    #[test]
    fn test_session_cookie() {
        let config = create_test_config();
        let token = token_for(&config, 6, false);
        let cookie = format!("theme=dark; {}={token}", config.auth.cookie_name);

        let user = authenticate(&parts(&[("cookie", &cookie)]), &config).unwrap();
        assert_eq!(user.user_id, 6);
        assert!(!user.is_admin);
    }

    #[test]
    fn test_invalid_bearer_falls_back_to_cookie() {
        let config = create_test_config();
        let token = token_for(&config, 7, true);
        let cookie = format!("{}={token}", config.auth.cookie_name);

        let user = authenticate(&parts(&[("authorization", "Bearer garbage"), ("cookie", &cookie)]), &config).unwrap();
        assert_eq!(user.user_id, 7);
    }

    #[test]
    fn test_other_cookies_are_ignored() {
        let config = create_test_config();
        let token = token_for(&config, 8, true);
        let cookie = format!("other_session={token}");

        let result = authenticate(&parts(&[("cookie", &cookie)]), &config);
        assert!(matches!(result, Err(Error::Unauthenticated { .. })));
    }
}
