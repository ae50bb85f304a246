//! # bello: backend for the Bello meeting and chat app
//!
//! This crate serves the HTTP API used by the Bello web frontend. The part implemented here is
//! account administration: session login/logout and an admin-only user directory with listing,
//! detail inspection and deletion.
//!
//! ## Architecture
//!
//! The server is built on [Axum](https://github.com/tokio-rs/axum) and stores everything in
//! PostgreSQL through [sqlx](https://github.com/launchbadge/sqlx).
//!
//! - The **API layer** ([`api`]) holds the route handlers and the JSON models. Every response is
//!   wrapped in a `status` envelope, see [`api::models::responses::ApiResponse`].
//! - The **auth layer** ([`auth`]) issues and verifies JWT session tokens, carried either as a
//!   bearer token or in an HTTP-only cookie, and guards the admin routes.
//! - The **database layer** ([`db`]) exposes the [`UserStore`](db::store::UserStore) trait that
//!   handlers talk to, implemented over repositories for production and in memory for tests.
//! - **Configuration** ([`config`]) merges defaults, a YAML file and environment variables.
//!
//! ## Routes
//!
//! Everything under `/api` gets the configured CORS policy. Successful preflight responses are
//! normalized to `204 No Content` with an empty body.
//!
//! | Route | Auth |
//! |---|---|
//! | `GET /api/admin/users` | admin |
//! | `GET /api/admin/users/{id}` | admin |
//! | `DELETE /api/admin/users/{id}` | admin |
//! | `POST /api/login`, `POST /api/logout` | none |
//! | `GET /api/openapi.json`, `GET /api/docs` | none |
//! | `GET /healthz` | none |
//!
//! ## Startup
//!
//! [`Application::new`] connects to the database, runs the embedded migrations and creates or
//! refreshes the initial admin account when `admin.*` is configured. [`Application::serve`] then
//! runs until the shutdown future resolves.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::{
    api::handlers::{admin_users, auth as auth_handlers},
    auth::{middleware::require_admin, password},
    config::CorsOrigin,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
        store::{PgUserStore, UserStore},
    },
    openapi::ApiDoc,
};
use axum::{
    Json, Router,
    body::Body,
    extract::Request,
    http::{self, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{Next, from_fn, from_fn_with_state},
    response::Response,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::UserId;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .users(Arc::new(PgUserStore::new(pool)))
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Config,
}

/// Get the bello database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user, or bring an existing account with that username back to admin
/// with the configured email and password.
///
/// Idempotent, so it runs on every startup.
#[instrument(skip_all, fields(username = %username))]
pub async fn create_initial_admin_user(username: &str, email: &str, password: &str, db: &PgPool) -> anyhow::Result<UserId> {
    let password_hash = password::hash_password(password)?;

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    let user_id = match user_repo.get_user_by_username(username).await? {
        Some(existing) => {
            let update = UserUpdateDBRequest {
                email: Some(email.to_string()),
                is_admin: Some(true),
                password_hash: Some(password_hash),
            };
            user_repo.update(existing.id, &update).await?;
            debug!("Refreshed admin account {}", existing.id);
            existing.id
        }
        None => {
            let create = UserCreateDBRequest {
                username: username.to_string(),
                email: email.to_string(),
                is_admin: true,
                password_hash: Some(password_hash),
            };
            let created = user_repo.create(&create).await?;
            info!("Created admin account {}", created.id);
            created.id
        }
    };

    tx.commit().await?;
    Ok(user_id)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = &config.cors;

    let allow_origin = if cors.allowed_origins.contains(&CorsOrigin::Wildcard) {
        // A literal `*` is not allowed together with credentials
        if cors.allow_credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        let origins = cors
            .allowed_origins
            .iter()
            .map(|origin| origin.as_header_value().parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    let headers = cors
        .allowed_headers
        .iter()
        .map(|name| HeaderName::from_bytes(name.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(headers)
        .allow_credentials(cors.allow_credentials);

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Rewrite successful `OPTIONS` responses to `204 No Content` with an empty body, keeping the
/// CORS headers.
async fn normalize_preflight(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    let response = next.run(request).await;
    if !response.status().is_success() {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.status = StatusCode::NO_CONTENT;
    parts.headers.remove(http::header::CONTENT_LENGTH);
    parts.headers.remove(http::header::CONTENT_TYPE);
    Response::from_parts(parts, Body::empty())
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn healthz() -> &'static str {
    "OK"
}

/// Build the application router.
///
/// Admin routes are guarded by [`require_admin`]; the CORS and preflight layers wrap the `/api`
/// subtree only, while tracing wraps everything.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let admin_routes = Router::new()
        .route("/admin/users", get(admin_users::list_users).options(admin_users::preflight))
        .route(
            "/admin/users/{user_id}",
            get(admin_users::get_user_details)
                .delete(admin_users::delete_user)
                .options(admin_users::preflight),
        )
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    let api_routes = Router::new()
        .merge(admin_routes)
        .route("/login", post(auth_handlers::login))
        .route("/logout", post(auth_handlers::logout))
        .route("/openapi.json", get(openapi_json))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(create_cors_layer(&state.config)?)
        .layer(from_fn(normalize_preflight));

    let router = Router::new()
        .nest("/api", api_routes)
        .route("/healthz", get(healthz))
        .with_state(state.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// Main application struct that owns the router and the database pool.
///
/// 1. **Create**: [`Application::new`] connects, migrates and bootstraps the admin account
/// 2. **Serve**: [`Application::serve`] binds `host:port` and handles requests until shutdown
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!(
            "Connecting to postgres at {}:{}/{}",
            config.database.host, config.database.port, config.database.name
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect_with(config.database.connect_options())
            .await?;

        migrator().run(&pool).await?;

        let admin = &config.admin;
        match (&admin.username, &admin.email, &admin.password) {
            (Some(username), Some(email), Some(password)) => {
                create_initial_admin_user(username, email, password, &pool).await?;
            }
            (Some(username), _, None) => warn!("No admin password configured, skipping bootstrap of {}", username),
            _ => debug!("No initial admin configured"),
        }

        let state = AppState::builder()
            .users(Arc::new(PgUserStore::new(pool.clone())))
            .config(config.clone())
            .build();
        let router = build_router(&state)?;

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Bello listening on http://{}", bind_addr);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::CorsOrigin,
        db::{in_memory::InMemoryUserStore, models::users::UserCreateDBRequest},
        test_utils::{create_pg_test_server, create_test_config, create_test_server},
    };
    use axum_test::TestServer;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn test_healthz() {
        let server = create_test_server(InMemoryUserStore::new());
        let response = server.get("/healthz").add_header("origin", "http://localhost:5173").await;
        response.assert_status_ok();
        response.assert_text("OK");
        // CORS is scoped to /api
        assert!(response.maybe_header("access-control-allow-origin").is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_cors_applies_to_api_routes() {
        let server = create_test_server(InMemoryUserStore::new());

        let allowed = server.post("/api/logout").add_header("origin", "http://localhost:5173").await;
        assert_eq!(allowed.header("access-control-allow-origin"), "http://localhost:5173");
        assert_eq!(allowed.header("access-control-allow-credentials"), "true");
        // No route sets headers a browser would need to read
        assert!(allowed.maybe_header("access-control-expose-headers").is_none());

        let foreign = server.post("/api/logout").add_header("origin", "https://evil.example").await;
        assert!(foreign.maybe_header("access-control-allow-origin").is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_preflight_on_auth_routes_is_204() {
        let server = create_test_server(InMemoryUserStore::new());

        let response = server
            .method(Method::OPTIONS, "/api/login")
            .add_header("origin", "http://localhost:5173")
            .add_header("access-control-request-method", "POST")
            .await;

        response.assert_status(StatusCode::NO_CONTENT);
        assert!(response.as_bytes().is_empty());
        assert_eq!(response.header("access-control-max-age"), "3600");
    }

    #[test_log::test(tokio::test)]
    async fn test_openapi_document_is_served() {
        let server = create_test_server(InMemoryUserStore::new());

        let response = server.get("/api/openapi.json").await;
        response.assert_status_ok();
        let doc: serde_json::Value = response.json();
        assert!(doc["paths"]["/admin/users/{user_id}"]["delete"].is_object());

        server.get("/api/docs").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_normalize_preflight_only_touches_successful_options() {
        use tower::ServiceExt;

        let app = Router::new()
            .route("/x", get(|| async { "body" }).options(|| async { "ignored" }))
            .layer(from_fn(normalize_preflight));
        let request = |method: Method, uri: &str| axum::http::Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();

        let response = app.clone().oneshot(request(Method::OPTIONS, "/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(http::header::CONTENT_TYPE).is_none());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());

        let response = app.clone().oneshot(request(Method::GET, "/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request(Method::OPTIONS, "/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_wildcard_origin_with_credentials_builds() {
        let mut config = create_test_config();
        config.cors.allowed_origins = vec![CorsOrigin::Wildcard];
        assert!(create_cors_layer(&config).is_ok());

        config.cors.allow_credentials = false;
        assert!(create_cors_layer(&config).is_ok());
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let mut config = create_test_config();
        config.cors.allowed_headers = vec!["not a header".to_string()];
        assert!(create_cors_layer(&config).is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_api_route_is_404() {
        let state = crate::test_utils::create_test_state(InMemoryUserStore::new());
        let server = TestServer::new(build_router(&state).unwrap()).unwrap();
        server.get("/api/nope").await.assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_initial_admin_is_created_then_refreshed(pool: PgPool) {
        let id = create_initial_admin_user("root", "root@bello.test", "first", &pool).await.unwrap();
        let again = create_initial_admin_user("root", "admin@bello.test", "second", &pool).await.unwrap();
        assert_eq!(id, again);

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_by_id(id).await.unwrap().unwrap();
        assert!(user.is_admin);
        assert_eq!(user.email, "admin@bello.test");
        assert!(password::verify_password("second", user.password_hash.as_deref().unwrap()).unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_login_and_delete_against_postgres(pool: PgPool) {
        let admin_id = create_initial_admin_user("root", "root@bello.test", "hunter2", &pool).await.unwrap();
        let victim = {
            let mut conn = pool.acquire().await.unwrap();
            Users::new(&mut conn)
                .create(&UserCreateDBRequest {
                    username: "victim".to_string(),
                    email: "victim@bello.test".to_string(),
                    is_admin: false,
                    password_hash: None,
                })
                .await
                .unwrap()
        };
        let server = create_pg_test_server(pool);

        let login: serde_json::Value = server
            .post("/api/login")
            .json(&json!({"username": "root", "password": "hunter2"}))
            .await
            .json();
        let bearer = format!("Bearer {}", login["token"].as_str().unwrap());
        assert_eq!(login["user"]["id"], admin_id);

        server
            .delete(&format!("/api/admin/users/{admin_id}"))
            .add_header("authorization", bearer.clone())
            .await
            .assert_status_bad_request();

        server
            .delete(&format!("/api/admin/users/{}", victim.id))
            .add_header("authorization", bearer.clone())
            .await
            .assert_status_ok();

        server
            .get(&format!("/api/admin/users/{}", victim.id))
            .add_header("authorization", bearer)
            .await
            .assert_status_not_found();
    }
}
