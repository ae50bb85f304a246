//! In-memory [`UserStore`] for tests.
//!
//! Keeps users and profiles in ordered maps behind a lock, so listings come back sorted by id just
//! like the PostgreSQL store. Faults can be injected to exercise the error paths of the handlers,
//! and delete calls are counted so tests can assert that guarded deletes never reach storage.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::RwLock;

use crate::db::{
    errors::{DbError, Result},
    handlers::UserFilter,
    models::users::{ProfileDBResponse, ProfileUpsertDBRequest, UserCreateDBRequest, UserDBResponse},
    store::UserStore,
};
use crate::types::UserId;

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, UserDBResponse>,
    profiles: BTreeMap<UserId, ProfileDBResponse>,
    next_id: UserId,
}

#[derive(Default)]
struct Faults {
    fail_all: AtomicBool,
    delete_removes_nothing: AtomicBool,
    delete_calls: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user with the next free id.
    pub fn insert_user(&self, request: UserCreateDBRequest) -> UserDBResponse {
        let mut tables = self.tables.write();
        let id = tables.users.keys().next_back().copied().unwrap_or(0).max(tables.next_id) + 1;
        tables.next_id = id;
        let user = build_user(id, request);
        tables.users.insert(id, user.clone());
        user
    }

    /// Insert a user under a fixed id, replacing any previous record with that id.
    pub fn insert_user_with_id(&self, id: UserId, request: UserCreateDBRequest) -> UserDBResponse {
        let user = build_user(id, request);
        self.tables.write().users.insert(id, user.clone());
        user
    }

    pub fn upsert_profile(&self, user_id: UserId, request: ProfileUpsertDBRequest) -> ProfileDBResponse {
        let profile = ProfileDBResponse {
            user_id,
            display_name: request.display_name,
            gender: request.gender,
            birthday: request.birthday,
            bio: request.bio,
            avatar_url: request.avatar_url,
            updated_at: Utc::now(),
        };
        self.tables.write().profiles.insert(user_id, profile.clone());
        profile
    }

    /// Make every subsequent call fail with an opaque storage error.
    pub fn fail_all(&self, enabled: bool) {
        self.faults.fail_all.store(enabled, Ordering::SeqCst);
    }

    /// Make `delete_user` report that nothing was removed, without raising an error.
    pub fn delete_removes_nothing(&self, enabled: bool) {
        self.faults.delete_removes_nothing.store(enabled, Ordering::SeqCst);
    }

    /// How many times `delete_user` has been invoked, whatever its outcome.
    pub fn delete_calls(&self) -> usize {
        self.faults.delete_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.tables.read().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_faults(&self) -> Result<()> {
        if self.faults.fail_all.load(Ordering::SeqCst) {
            return Err(DbError::Other(anyhow::anyhow!("injected storage failure")));
        }
        Ok(())
    }

    fn matches(&self, tables: &Tables, user: &UserDBResponse, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        let display_name = tables.profiles.get(&user.id).and_then(|p| p.display_name.as_deref());
        user.username.to_lowercase().contains(&needle)
            || user.email.to_lowercase().contains(&needle)
            || display_name.is_some_and(|name| name.to_lowercase().contains(&needle))
    }
}

fn build_user(id: UserId, request: UserCreateDBRequest) -> UserDBResponse {
    let now = Utc::now();
    UserDBResponse {
        id,
        username: request.username,
        email: request.email,
        is_admin: request.is_admin,
        password_hash: request.password_hash,
        created_at: now,
        updated_at: now,
        last_login: None,
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn list_users(&self, filter: &UserFilter) -> Result<(Vec<UserDBResponse>, i64)> {
        self.check_faults()?;
        let tables = self.tables.read();
        let matching: Vec<&UserDBResponse> = tables
            .users
            .values()
            .filter(|user| filter.search.as_deref().is_none_or(|needle| self.matches(&tables, user, needle)))
            .collect();

        let total = matching.len() as i64;
        let skip = usize::try_from(filter.skip).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.limit).unwrap_or(0);
        let page = matching.into_iter().skip(skip).take(limit).cloned().collect();

        Ok((page, total))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        self.check_faults()?;
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<ProfileDBResponse>> {
        self.check_faults()?;
        Ok(self.tables.read().profiles.get(&id).cloned())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        self.faults.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_faults()?;
        if self.faults.delete_removes_nothing.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let mut tables = self.tables.write();
        tables.profiles.remove(&id);
        Ok(tables.users.remove(&id).is_some())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserDBResponse>> {
        self.check_faults()?;
        Ok(self.tables.read().users.values().find(|u| u.username == username).cloned())
    }

    async fn record_login(&self, id: UserId) -> Result<()> {
        self.check_faults()?;
        if let Some(user) = self.tables.write().users.get_mut(&id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }
}
