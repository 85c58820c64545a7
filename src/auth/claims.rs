/// JWT Claims structure
///
/// Fixed, typed payload of an access token. Every field is required; a token
/// whose payload is missing any of them fails to deserialize and is rejected
/// as malformed before any field is trusted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::TokenError;
use crate::models::{Role, TokenScope};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub role: Role,
    /// Always `access` for signed tokens
    pub scope: TokenScope,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create access-token claims expiring `ttl` from now.
    pub fn new(user_id: Uuid, role: Role, ttl: chrono::Duration, issuer: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            role,
            scope: TokenScope::Access,
            exp: now + ttl.num_seconds(),
            iat: now,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= chrono::Utc::now().timestamp()
    }

    /// Structural checks serde cannot express.
    pub fn ensure_complete(&self) -> Result<Uuid, TokenError> {
        if self.scope != TokenScope::Access || self.iss.is_empty() {
            return Err(TokenError::Malformed);
        }
        self.user_id()
    }
}
