/// Domain models shared by the codec, the stores and the session manager.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Role granted to a user; carried inside access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(ValidationError::InvalidFormat("role".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for UserStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            _ => Err(ValidationError::InvalidFormat("status".to_string())),
        }
    }
}

/// Stored user. The password hash never leaves the server.
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A validated user about to be persisted. Id and timestamp are assigned by the store.
#[derive(Clone)]
pub struct NewUser {
    pub login: String,
    pub password_hash: String,
    pub role: Role,
    pub status: UserStatus,
    pub name: String,
}

/// Purpose tag for tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Access,
    Refresh,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Access => "access",
            TokenScope::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted refresh token. Holds only the hash of the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub scope: TokenScope,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// How the caller proved who they are on this request.
#[derive(Debug, Clone)]
pub enum Credential {
    Access,
    /// The presented refresh secret, needed by the rotation handler.
    Refresh(SecretString),
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
    pub credential: Credential,
}

/// Output of the authorization gate for a single request.
#[derive(Debug, Clone)]
pub enum Identity {
    /// No `Authorization` header was sent.
    Anonymous,
    User(AuthenticatedUser),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user.user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("Admin".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [UserStatus::Active, UserStatus::Inactive] {
            assert_eq!(status.as_str().parse::<UserStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_user_debug_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            login: "alice1".to_string(),
            password_hash: "$2b$12$secretsecret".to_string(),
            role: Role::User,
            status: UserStatus::Active,
            name: "Alice".to_string(),
            created_at: Utc::now(),
        };
        let debug = format!("{:?}", user);
        assert!(debug.contains("alice1"));
        assert!(!debug.contains("secretsecret"));
    }

    #[test]
    fn test_record_liveness() {
        let now = Utc::now();
        let record = RefreshTokenRecord {
            user_id: Uuid::new_v4(),
            scope: TokenScope::Refresh,
            hash: "abc".to_string(),
            expires_at: now,
        };
        assert!(!record.is_live(now));
        assert!(record.is_live(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_anonymous_identity() {
        assert!(Identity::Anonymous.is_anonymous());
        assert_eq!(Identity::Anonymous.user_id(), None);
    }
}
