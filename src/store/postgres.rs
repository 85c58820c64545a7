/// Postgres-backed stores
///
/// Parameterized queries against the `users` and `tokens` tables created by
/// `migrations/`. Every call runs under the configured storage deadline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::{with_deadline, TokenStore, UserStore};
use crate::error::DatabaseError;
use crate::models::{NewUser, RefreshTokenRecord, TokenScope, User};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    login: String,
    password_hash: String,
    role: String,
    status: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|_| DatabaseError::QueryExecution(format!("unknown role {:?}", row.role)))?;
        let status = row.status.parse().map_err(|_| {
            DatabaseError::QueryExecution(format!("unknown status {:?}", row.status))
        })?;

        Ok(User {
            id: row.id,
            login: row.login,
            password_hash: row.password_hash,
            role,
            status,
            name: row.name,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn fetch_one_where(&self, sql: &'static str, bind: UserKey<'_>) -> Result<User, DatabaseError> {
        let query = sqlx::query_as::<_, UserRow>(sql);
        let query = match bind {
            UserKey::Id(id) => query.bind(id),
            UserKey::Login(login) => query.bind(login),
        };

        let row = with_deadline(self.timeout, query.fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| DatabaseError::NotFound("user".to_string()))?;

        User::try_from(row)
    }
}

enum UserKey<'a> {
    Id(Uuid),
    Login(&'a str),
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, DatabaseError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let query = sqlx::query(
            r#"
            INSERT INTO users (id, login, password_hash, role, status, name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&user.login)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(&user.name)
        .bind(created_at);

        with_deadline(self.timeout, query.execute(&self.pool)).await?;

        Ok(User {
            id,
            login: user.login,
            password_hash: user.password_hash,
            role: user.role,
            status: user.status,
            name: user.name,
            created_at,
        })
    }

    async fn get_by_login(&self, login: &str) -> Result<User, DatabaseError> {
        self.fetch_one_where(
            r#"
            SELECT id, login, password_hash, role, status, name, created_at
            FROM users
            WHERE login = $1
            "#,
            UserKey::Login(login),
        )
        .await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, DatabaseError> {
        self.fetch_one_where(
            r#"
            SELECT id, login, password_hash, role, status, name, created_at
            FROM users
            WHERE id = $1
            "#,
            UserKey::Id(id),
        )
        .await
    }
}

#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgTokenStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), DatabaseError> {
        let query = sqlx::query(
            r#"
            INSERT INTO tokens (hash, scope, user_id, expiry)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.hash)
        .bind(record.scope.as_str())
        .bind(record.user_id)
        .bind(record.expires_at);

        with_deadline(self.timeout, query.execute(&self.pool)).await?;
        Ok(())
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: Uuid,
    ) -> Result<u64, DatabaseError> {
        let query = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope.as_str())
            .bind(user_id);

        let result = with_deadline(self.timeout, query.execute(&self.pool)).await?;
        Ok(result.rows_affected())
    }

    async fn find_live(&self, scope: TokenScope, hash: &str) -> Result<Uuid, DatabaseError> {
        let query = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id
            FROM tokens
            WHERE hash = $1 AND scope = $2 AND expiry > $3
            "#,
        )
        .bind(hash)
        .bind(scope.as_str())
        .bind(Utc::now());

        with_deadline(self.timeout, query.fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| DatabaseError::NotFound("token".to_string()))
    }

    async fn take_live(&self, scope: TokenScope, hash: &str) -> Result<Uuid, DatabaseError> {
        let query = sqlx::query_scalar::<_, Uuid>(
            r#"
            DELETE FROM tokens
            WHERE hash = $1 AND scope = $2 AND expiry > $3
            RETURNING user_id
            "#,
        )
        .bind(hash)
        .bind(scope.as_str())
        .bind(Utc::now());

        with_deadline(self.timeout, query.fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| DatabaseError::NotFound("token".to_string()))
    }

    async fn rotate(&self, record: &RefreshTokenRecord) -> Result<(), DatabaseError> {
        let pool = &self.pool;
        let rotation = async move {
            let mut tx = pool.begin().await?;

            sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
                .bind(record.scope.as_str())
                .bind(record.user_id)
                .execute(&mut tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO tokens (hash, scope, user_id, expiry)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&record.hash)
            .bind(record.scope.as_str())
            .bind(record.user_id)
            .bind(record.expires_at)
            .execute(&mut tx)
            .await?;

            tx.commit().await
        };

        with_deadline(self.timeout, rotation).await
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let query = sqlx::query("DELETE FROM tokens WHERE expiry <= $1").bind(Utc::now());

        let result = with_deadline(self.timeout, query.execute(&self.pool)).await?;
        Ok(result.rows_affected())
    }
}
