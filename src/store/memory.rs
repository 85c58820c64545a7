/// In-memory stores for tests and single-process runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{TokenStore, UserStore};
use crate::error::DatabaseError;
use crate::models::{NewUser, RefreshTokenRecord, TokenScope, User};

#[derive(Default)]
struct Users {
    by_id: HashMap<Uuid, User>,
    by_login: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Users>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, DatabaseError> {
        let mut users = self.users.write().await;
        if users.by_login.contains_key(&user.login) {
            return Err(DatabaseError::DuplicateLogin);
        }

        let stored = User {
            id: Uuid::new_v4(),
            login: user.login,
            password_hash: user.password_hash,
            role: user.role,
            status: user.status,
            name: user.name,
            created_at: Utc::now(),
        };
        users.by_login.insert(stored.login.clone(), stored.id);
        users.by_id.insert(stored.id, stored.clone());

        Ok(stored)
    }

    async fn get_by_login(&self, login: &str) -> Result<User, DatabaseError> {
        let users = self.users.read().await;
        users
            .by_login
            .get(login)
            .and_then(|id| users.by_id.get(id))
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound("user".to_string()))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<User, DatabaseError> {
        self.users
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound("user".to_string()))
    }
}

/// Keyed like the `tokens` table: `(scope, hash)`.
#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<(TokenScope, String), RefreshTokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), DatabaseError> {
        self.records
            .write()
            .await
            .insert((record.scope, record.hash.clone()), record.clone());
        Ok(())
    }

    async fn delete_all_for_user(
        &self,
        scope: TokenScope,
        user_id: Uuid,
    ) -> Result<u64, DatabaseError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !(r.scope == scope && r.user_id == user_id));
        Ok((before - records.len()) as u64)
    }

    async fn find_live(&self, scope: TokenScope, hash: &str) -> Result<Uuid, DatabaseError> {
        let now = Utc::now();
        self.records
            .read()
            .await
            .get(&(scope, hash.to_string()))
            .filter(|r| r.is_live(now))
            .map(|r| r.user_id)
            .ok_or_else(|| DatabaseError::NotFound("token".to_string()))
    }

    async fn take_live(&self, scope: TokenScope, hash: &str) -> Result<Uuid, DatabaseError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let key = (scope, hash.to_string());

        match records.get(&key) {
            Some(record) if record.is_live(now) => {
                let user_id = record.user_id;
                records.remove(&key);
                Ok(user_id)
            }
            _ => Err(DatabaseError::NotFound("token".to_string())),
        }
    }

    async fn rotate(&self, record: &RefreshTokenRecord) -> Result<(), DatabaseError> {
        let mut records = self.records.write().await;
        records.retain(|_, r| !(r.scope == record.scope && r.user_id == record.user_id));
        records.insert((record.scope, record.hash.clone()), record.clone());
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.is_live(now));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, UserStatus};
    use chrono::Duration;

    fn record(user_id: Uuid, hash: &str, ttl: Duration) -> RefreshTokenRecord {
        RefreshTokenRecord {
            user_id,
            scope: TokenScope::Refresh,
            hash: hash.to_string(),
            expires_at: Utc::now() + ttl,
        }
    }

    fn new_user(login: &str) -> NewUser {
        NewUser {
            login: login.to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role: Role::User,
            status: UserStatus::Active,
            name: "Alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_live() {
        let store = MemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        store.insert(&record(user_id, "h1", Duration::days(7))).await.unwrap();

        assert_eq!(store.find_live(TokenScope::Refresh, "h1").await.unwrap(), user_id);
        assert!(store.find_live(TokenScope::Access, "h1").await.is_err());
        assert!(store.find_live(TokenScope::Refresh, "h2").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_record_looks_absent() {
        let store = MemoryTokenStore::new();
        store
            .insert(&record(Uuid::new_v4(), "old", Duration::seconds(-1)))
            .await
            .unwrap();

        let expired = store.find_live(TokenScope::Refresh, "old").await;
        let absent = store.find_live(TokenScope::Refresh, "never").await;
        assert!(matches!(expired, Err(DatabaseError::NotFound(_))));
        assert!(matches!(absent, Err(DatabaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_all_for_user_only_touches_that_user() {
        let store = MemoryTokenStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.insert(&record(alice, "a1", Duration::days(1))).await.unwrap();
        store.insert(&record(alice, "a2", Duration::days(1))).await.unwrap();
        store.insert(&record(bob, "b1", Duration::days(1))).await.unwrap();

        assert_eq!(store.delete_all_for_user(TokenScope::Refresh, alice).await.unwrap(), 2);
        assert_eq!(store.delete_all_for_user(TokenScope::Refresh, alice).await.unwrap(), 0);
        assert_eq!(store.find_live(TokenScope::Refresh, "b1").await.unwrap(), bob);
    }

    #[tokio::test]
    async fn test_take_live_consumes_once() {
        let store = MemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        store.insert(&record(user_id, "h", Duration::days(1))).await.unwrap();

        assert_eq!(store.take_live(TokenScope::Refresh, "h").await.unwrap(), user_id);
        assert!(store.take_live(TokenScope::Refresh, "h").await.is_err());
    }

    #[tokio::test]
    async fn test_rotate_leaves_single_record() {
        let store = MemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        store.insert(&record(user_id, "first", Duration::days(1))).await.unwrap();
        store.rotate(&record(user_id, "second", Duration::days(1))).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.find_live(TokenScope::Refresh, "first").await.is_err());
        assert_eq!(store.find_live(TokenScope::Refresh, "second").await.unwrap(), user_id);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryTokenStore::new();
        store.insert(&record(Uuid::new_v4(), "dead", Duration::seconds(-5))).await.unwrap();
        store.insert(&record(Uuid::new_v4(), "live", Duration::days(1))).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_login() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice1")).await.unwrap();

        let second = store.insert(new_user("alice1")).await;
        assert!(matches!(second, Err(DatabaseError::DuplicateLogin)));

        // Logins are case-sensitive.
        assert!(store.insert(new_user("Alice1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_user_lookups() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("alice1")).await.unwrap();

        assert_eq!(store.get_by_login("alice1").await.unwrap().id, user.id);
        assert_eq!(store.get_by_id(user.id).await.unwrap().login, "alice1");
        assert!(matches!(
            store.get_by_login("bob").await,
            Err(DatabaseError::NotFound(_))
        ));
    }
}
