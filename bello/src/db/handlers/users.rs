//! Database repository for users.

use crate::types::UserId;
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::users::{ProfileDBResponse, ProfileUpsertDBRequest, UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    /// Case-insensitive substring matched against username, email and display name
    pub search: Option<String>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, search: None }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// ILIKE pattern for the search term, with LIKE wildcards in the term escaped
    fn search_pattern(&self) -> Option<String> {
        self.search.as_deref().map(|term| {
            let mut pattern = String::with_capacity(term.len() + 2);
            pattern.push('%');
            for c in term.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
    }
}

// Database entity models
#[derive(Debug, Clone, FromRow)]
struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
struct Profile {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserDBResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
            password_hash: user.password_hash,
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login: user.last_login,
        }
    }
}

impl From<Profile> for ProfileDBResponse {
    fn from(profile: Profile) -> Self {
        Self {
            user_id: profile.user_id,
            display_name: profile.display_name,
            gender: profile.gender,
            birthday: profile.birthday,
            bio: profile.bio,
            avatar_url: profile.avatar_url,
            updated_at: profile.updated_at,
        }
    }
}

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.is_admin, u.password_hash, u.created_at, u.updated_at, u.last_login";

const SEARCH_CONDITION: &str = "$1::TEXT IS NULL OR u.username ILIKE $1 OR u.email ILIKE $1 OR p.display_name ILIKE $1";

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, is_admin, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&request.username)
        .bind(&request.email)
        .bind(request.is_admin)
        .bind(&request.password_hash)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user.into())
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(Into::into))
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip, search = filter.search.is_some()), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users u LEFT JOIN user_profiles p ON p.user_id = u.id \
             WHERE {SEARCH_CONDITION} ORDER BY u.id LIMIT $2 OFFSET $3"
        );
        let users = sqlx::query_as::<_, User>(&query)
            .bind(filter.search_pattern())
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, filter), fields(search = filter.search.is_some()), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM users u LEFT JOIN user_profiles p ON p.user_id = u.id WHERE {SEARCH_CONDITION}");
        let total = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.search_pattern())
            .fetch_one(&mut *self.db)
            .await?;

        Ok(total)
    }

    /// Profiles, meetings, participation and chat messages go with the user via `ON DELETE CASCADE`.
    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                is_admin = COALESCE($3, is_admin),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.email)
        .bind(request.is_admin)
        .bind(&request.password_hash)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user.into())
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_user_by_username(&mut self, username: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user.map(Into::into))
    }

    #[instrument(skip(self), err)]
    pub async fn get_profile(&mut self, user_id: UserId) -> Result<Option<ProfileDBResponse>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(profile.map(Into::into))
    }

    #[instrument(skip(self, request), err)]
    pub async fn upsert_profile(&mut self, user_id: UserId, request: &ProfileUpsertDBRequest) -> Result<ProfileDBResponse> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO user_profiles (user_id, display_name, gender, birthday, bio, avatar_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                gender = EXCLUDED.gender,
                birthday = EXCLUDED.birthday,
                bio = EXCLUDED.bio,
                avatar_url = EXCLUDED.avatar_url,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.display_name)
        .bind(&request.gender)
        .bind(request.birthday)
        .bind(&request.bio)
        .bind(&request.avatar_url)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(profile.into())
    }

    #[instrument(skip(self), err)]
    pub async fn record_login(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn user_request(username: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            is_admin: false,
            password_hash: None,
        }
    }

    #[test]
    fn test_search_pattern_escapes_like_wildcards() {
        let filter = UserFilter::new(0, 10).with_search("50%_a\\b");
        assert_eq!(filter.search_pattern().as_deref(), Some("%50\\%\\_a\\\\b%"));
        assert_eq!(UserFilter::new(0, 10).search_pattern(), None);
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_create_and_get_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&user_request("alice")).await.unwrap();
        assert_eq!(created.username, "alice");
        assert!(!created.is_admin);
        assert!(created.last_login.is_none());

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.email, "alice@example.com");

        let by_name = repo.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert!(repo.get_by_id(created.id + 1000).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_duplicate_username_is_a_unique_violation(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&user_request("bob")).await.unwrap();
        let mut duplicate = user_request("bob");
        duplicate.email = "other@example.com".to_string();

        let err = repo.create(&duplicate).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_list_pages_and_counts(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        for i in 0..25 {
            repo.create(&user_request(&format!("user{i:02}"))).await.unwrap();
        }

        let filter = UserFilter::new(10, 10);
        let page = repo.list(&filter).await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].username, "user10");
        assert!(page.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(repo.count(&filter).await.unwrap(), 25);

        let tail = repo.list(&UserFilter::new(20, 10)).await.unwrap();
        assert_eq!(tail.len(), 5);
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_search_matches_username_email_and_display_name(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let carol = repo.create(&user_request("carol")).await.unwrap();
        repo.create(&user_request("dave")).await.unwrap();
        repo.upsert_profile(
            carol.id,
            &ProfileUpsertDBRequest {
                display_name: Some("Captain Zed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let by_name = UserFilter::new(0, 100).with_search("CAR");
        assert_eq!(repo.count(&by_name).await.unwrap(), 1);

        let by_display_name = UserFilter::new(0, 100).with_search("zed");
        let found = repo.list(&by_display_name).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, carol.id);

        let by_email = UserFilter::new(0, 100).with_search("example.com");
        assert_eq!(repo.count(&by_email).await.unwrap(), 2);

        // Wildcards are matched literally
        let literal = UserFilter::new(0, 100).with_search("%");
        assert_eq!(repo.count(&literal).await.unwrap(), 0);
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_delete_cascades_to_profile(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let erin = repo.create(&user_request("erin")).await.unwrap();
        repo.upsert_profile(
            erin.id,
            &ProfileUpsertDBRequest {
                bio: Some("hello".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(repo.delete(erin.id).await.unwrap());
        assert!(repo.get_by_id(erin.id).await.unwrap().is_none());
        assert!(repo.get_profile(erin.id).await.unwrap().is_none());

        // Nothing left to delete
        assert!(!repo.delete(erin.id).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    #[ignore = "requires a PostgreSQL database (DATABASE_URL)"]
    async fn test_update_and_record_login(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let frank = repo.create(&user_request("frank")).await.unwrap();
        let updated = repo
            .update(
                frank.id,
                &UserUpdateDBRequest {
                    is_admin: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_admin);
        assert_eq!(updated.email, frank.email);

        repo.record_login(frank.id).await.unwrap();
        assert!(repo.get_by_id(frank.id).await.unwrap().unwrap().last_login.is_some());

        let missing = repo.update(frank.id + 1000, &UserUpdateDBRequest::default()).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }
}
