//! Test utilities for handler and integration tests (available with `test-utils` feature).

use std::sync::Arc;

use axum_test::TestServer;
use sqlx::PgPool;

use crate::{
    AppState,
    api::models::users::AuthContext,
    auth::{password, session},
    config::Config,
    db::{
        in_memory::InMemoryUserStore,
        models::users::{UserCreateDBRequest, UserDBResponse},
        store::PgUserStore,
    },
    types::UserId,
};

pub fn create_test_config() -> Config {
    Config {
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    }
}

pub fn create_test_state(store: InMemoryUserStore) -> AppState {
    AppState::builder().users(Arc::new(store)).config(create_test_config()).build()
}

/// A test server over the full router, backed by the given in-memory store.
pub fn create_test_server(store: InMemoryUserStore) -> TestServer {
    let router = crate::build_router(&create_test_state(store)).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// A test server over the full router, backed by PostgreSQL.
pub fn create_pg_test_server(pool: PgPool) -> TestServer {
    let state = AppState::builder()
        .users(Arc::new(PgUserStore::new(pool)))
        .config(create_test_config())
        .build();
    let router = crate::build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Sign a session token for an arbitrary user id, whether or not the user exists.
pub fn token_for(config: &Config, user_id: UserId, is_admin: bool) -> String {
    let user = AuthContext {
        user_id,
        username: format!("user{user_id}"),
        is_admin,
    };
    session::create_session_token(&user, config).expect("Failed to create session token")
}

/// `Authorization` header value for an admin session.
pub fn admin_header(user_id: UserId) -> String {
    format!("Bearer {}", token_for(&create_test_config(), user_id, true))
}

/// `Authorization` header value for a non-admin session.
pub fn user_header(user_id: UserId) -> String {
    format!("Bearer {}", token_for(&create_test_config(), user_id, false))
}

pub fn user_request(username: &str) -> UserCreateDBRequest {
    UserCreateDBRequest {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        is_admin: false,
        password_hash: None,
    }
}

/// Insert `count` users named `user01`, `user02`, ... with ids 1..=count on an empty store.
pub fn seed_users(store: &InMemoryUserStore, count: usize) -> Vec<UserDBResponse> {
    (1..=count).map(|i| store.insert_user(user_request(&format!("user{i:02}")))).collect()
}

/// Hash with minimal Argon2 cost so login tests stay fast.
pub fn fast_hash(plain: &str) -> String {
    let params = password::Argon2Params {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };
    password::hash_password_with_params(plain, params).expect("Failed to hash password")
}
