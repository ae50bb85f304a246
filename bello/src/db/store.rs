//! The persistence handle request handlers talk to.
//!
//! Handlers never touch a connection pool directly; they go through [`UserStore`], which lets the
//! router be assembled over PostgreSQL in production and over
//! [`InMemoryUserStore`](crate::db::in_memory::InMemoryUserStore) in tests.

use crate::db::{
    errors::Result,
    handlers::{Repository, UserFilter, Users},
    models::users::{ProfileDBResponse, UserDBResponse},
};
use crate::types::UserId;
use sqlx::PgPool;
use tracing::instrument;

/// User directory operations needed by the HTTP layer.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// One page of users matching the filter, plus the total number of matches.
    async fn list_users(&self, filter: &UserFilter) -> Result<(Vec<UserDBResponse>, i64)>;

    /// Basic account record. `None` means the user does not exist.
    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>>;

    /// Profile record. `None` is legitimate for users who never filled one in.
    async fn get_profile(&self, id: UserId) -> Result<Option<ProfileDBResponse>>;

    /// Removes the user and everything that references them. Returns `false` when nothing was
    /// deleted.
    async fn delete_user(&self, id: UserId) -> Result<bool>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserDBResponse>>;

    async fn record_login(&self, id: UserId) -> Result<()>;
}

/// PostgreSQL-backed store. Each call checks out its own pooled connection.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self, filter), err)]
    async fn list_users(&self, filter: &UserFilter) -> Result<(Vec<UserDBResponse>, i64)> {
        // Page and count are read in one transaction so they describe the same snapshot
        let mut tx = self.pool.begin().await?;
        let mut repo = Users::new(&mut tx);
        let users = repo.list(filter).await?;
        let total = repo.count(filter).await?;
        tx.commit().await?;

        Ok((users, total))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_by_id(id).await
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<ProfileDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_profile(id).await
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).delete(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_user_by_username(username).await
    }

    async fn record_login(&self, id: UserId) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).record_login(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::users::UserCreateDBRequest;

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_pg_store_list_and_delete(pool: PgPool) {
        {
            let mut conn = pool.acquire().await.unwrap();
            let mut repo = Users::new(&mut conn);
            for name in ["ann", "ben", "cat"] {
                repo.create(&UserCreateDBRequest {
                    username: name.to_string(),
                    email: format!("{name}@example.com"),
                    is_admin: false,
                    password_hash: None,
                })
                .await
                .unwrap();
            }
        }

        let store = PgUserStore::new(pool);
        let (users, total) = store.list_users(&UserFilter::new(0, 2)).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(total, 3);

        let ben = store.get_user_by_username("ben").await.unwrap().unwrap();
        assert!(store.get_profile(ben.id).await.unwrap().is_none());
        assert!(store.delete_user(ben.id).await.unwrap());
        assert!(store.get_user(ben.id).await.unwrap().is_none());
        assert!(!store.delete_user(ben.id).await.unwrap());
    }
}
