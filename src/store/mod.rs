/// Persistence for users and refresh tokens.
///
/// Both stores are traits so the session manager can run against Postgres in
/// production and against the in-memory backend in tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::models::{NewUser, RefreshTokenRecord, TokenScope, User};

pub use memory::{MemoryTokenStore, MemoryUserStore};
pub use postgres::{PgTokenStore, PgUserStore};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist a new user. A taken login fails with `DatabaseError::DuplicateLogin`.
    async fn insert(&self, user: NewUser) -> Result<User, DatabaseError>;

    /// Case-sensitive lookup. Fails with `DatabaseError::NotFound`.
    async fn get_by_login(&self, login: &str) -> Result<User, DatabaseError>;

    async fn get_by_id(&self, id: Uuid) -> Result<User, DatabaseError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), DatabaseError>;

    /// Remove every record for `(scope, user_id)`. Returns how many were removed;
    /// removing nothing is not an error.
    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: Uuid,
    ) -> Result<u64, DatabaseError>;

    /// Owner of the non-expired record with this hash. Absent and expired
    /// records both fail with `DatabaseError::NotFound`.
    async fn find_live(&self, scope: TokenScope, hash: &str) -> Result<Uuid, DatabaseError>;

    /// Like `find_live`, but deletes the record in the same step so a token can
    /// be consumed at most once.
    async fn take_live(&self, scope: TokenScope, hash: &str) -> Result<Uuid, DatabaseError>;

    /// Delete all records for the record's `(scope, user_id)` and insert it,
    /// atomically where the backend allows.
    async fn rotate(&self, record: &RefreshTokenRecord) -> Result<(), DatabaseError>;

    /// Drop expired rows. Lookups already ignore them; this only reclaims space.
    async fn purge_expired(&self) -> Result<u64, DatabaseError>;
}

/// Bound a storage call by `deadline`. An overrun surfaces as
/// `DatabaseError::Timeout` and the in-flight future is dropped.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(DatabaseError::from),
        Err(_) => {
            tracing::error!(deadline_ms = deadline.as_millis() as u64, "Storage call timed out");
            Err(DatabaseError::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_overrun_is_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, sqlx::Error>(())
        };

        let result = with_deadline(Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(DatabaseError::Timeout)));
    }

    #[tokio::test]
    async fn test_deadline_passes_errors_through() {
        let missing = async { Err::<(), _>(sqlx::Error::RowNotFound) };

        let result = with_deadline(Duration::from_secs(1), missing).await;
        assert!(matches!(result, Err(DatabaseError::NotFound(_))));
    }
}
