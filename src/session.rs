/// Session lifecycle
///
/// Registration, login, refresh-token rotation and logout. Holds no per-user
/// state between calls; every cross-request guarantee comes from the stores.

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{
    hash_password, hash_password_blocking, hash_token, mint_opaque, verify_password_blocking,
    TokenCodec,
};
use crate::configuration::Settings;
use crate::error::{AppError, AuthError, DatabaseError, ErrorContext, Validator};
use crate::models::{NewUser, RefreshTokenRecord, Role, TokenScope, User, UserStatus};
use crate::store::{TokenStore, UserStore};
use crate::validators::{is_valid_login, is_valid_name, is_valid_secret};

/// Access and refresh token issued together.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub refresh_expires_at: chrono::DateTime<Utc>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Unvalidated registration input.
pub struct Registration {
    pub login: String,
    pub secret: String,
    pub name: String,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

pub struct SessionConfig {
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    pub hash_cost: u32,
    /// Deadline for each bcrypt call.
    pub hash_timeout: Duration,
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            access_ttl: settings.jwt.access_ttl(),
            refresh_ttl: settings.jwt.refresh_ttl(),
            hash_cost: settings.auth.hash_cost,
            hash_timeout: settings.storage.timeout(),
        }
    }
}

pub struct SessionManager {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    codec: Arc<TokenCodec>,
    config: SessionConfig,
    /// Verified against when the login is unknown so both rejections cost the same.
    dummy_hash: String,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        codec: Arc<TokenCodec>,
        config: SessionConfig,
    ) -> Result<Self, AppError> {
        let dummy_hash = hash_password(&Uuid::new_v4().to_string(), config.hash_cost)?;

        Ok(Self {
            users,
            tokens,
            codec,
            config,
            dummy_hash,
        })
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        self.config.access_ttl
    }

    /// Validate, hash and persist a new user.
    ///
    /// # Errors
    /// - `ValidationError::Failed` listing every invalid field
    /// - `DatabaseError::DuplicateLogin` if the login is taken
    pub async fn register(&self, input: Registration) -> Result<User, AppError> {
        let context = ErrorContext::new("user_registration");

        let mut v = Validator::new();
        let login = v.check(is_valid_login(&input.login), "login");
        let name = v.check(is_valid_name(&input.name), "name");
        v.check(is_valid_secret(&input.secret), "secret");
        v.finish()?;

        let (login, name) = match (login, name) {
            (Some(login), Some(name)) => (login, name),
            _ => return Err(AppError::Internal("validator accepted missing field".to_string())),
        };

        let password_hash =
            hash_password_blocking(input.secret, self.config.hash_cost, self.config.hash_timeout)
                .await?;

        let user = self
            .users
            .insert(NewUser {
                login,
                password_hash,
                role: input.role.unwrap_or_default(),
                status: input.status.unwrap_or_default(),
                name,
            })
            .await
            .map_err(|e| {
                let err = AppError::from(e);
                context.log_error(&err);
                err
            })?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %user.id,
            "User registered successfully"
        );

        Ok(user)
    }

    /// Verify credentials and issue a fresh pair, replacing any earlier refresh token.
    ///
    /// Unknown login and wrong secret are the same `InvalidCredentials` failure.
    pub async fn login(&self, login: &str, secret: &str) -> Result<TokenPair, AppError> {
        let context = ErrorContext::new("user_login");

        let user = match self.users.get_by_login(login).await {
            Ok(user) => Some(user),
            Err(DatabaseError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let matched =
            verify_password_blocking(secret.to_string(), hash, self.config.hash_timeout).await?;

        let user = match user {
            Some(user) if matched => user,
            Some(user) => {
                let err = AppError::from(AuthError::InvalidCredentials);
                context.with_user_id(user.id).log_error(&err);
                return Err(err);
            }
            None => {
                let err = AppError::from(AuthError::InvalidCredentials);
                context.log_error(&err);
                return Err(err);
            }
        };
        let context = context.with_user_id(user.id);

        if !user.is_active() {
            let err = AppError::from(AuthError::AccountInactive);
            context.log_error(&err);
            return Err(err);
        }

        let pair = self.issue_pair(&user).await.map_err(|err| {
            context.log_error(&err);
            err
        })?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %user.id,
            "User logged in successfully"
        );

        Ok(pair)
    }

    /// Exchange a refresh token for a new pair. The presented token is consumed
    /// whether or not the rest succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let context = ErrorContext::new("token_refresh");
        let hash = hash_token(refresh_token);

        let user_id = self
            .tokens
            .take_live(TokenScope::Refresh, &hash)
            .await
            .map_err(|e| {
                let err = match e {
                    DatabaseError::NotFound(_) => {
                        AppError::from(AuthError::InvalidAuthenticationToken)
                    }
                    other => other.into(),
                };
                context.log_error(&err);
                err
            })?;
        let context = context.with_user_id(user_id);

        let user = self.active_user(user_id).await.map_err(|err| {
            context.log_error(&err);
            err
        })?;
        let pair = self.issue_pair(&user).await.map_err(|err| {
            context.log_error(&err);
            err
        })?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %user.id,
            "Token refreshed successfully"
        );

        Ok(pair)
    }

    /// Remove every refresh token the user holds. Calling it again is a no-op.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        let removed = self
            .tokens
            .delete_all_for_user(TokenScope::Refresh, user_id)
            .await?;

        tracing::info!(user_id = %user_id, removed, "User logged out");
        Ok(())
    }

    /// Owner of a live refresh token, as the authorization gate needs it.
    pub async fn resolve_refresh_token(&self, refresh_token: &str) -> Result<User, AppError> {
        let hash = hash_token(refresh_token);
        let user_id = self
            .tokens
            .find_live(TokenScope::Refresh, &hash)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => AppError::from(AuthError::InvalidAuthenticationToken),
                other => other.into(),
            })?;

        self.active_user(user_id).await
    }

    /// Drop refresh tokens past their expiry. Expired tokens are already
    /// rejected; this only reclaims storage.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let removed = self.tokens.purge_expired().await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired refresh tokens");
        }
        Ok(removed)
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AppError> {
        Ok(self.users.get_by_id(user_id).await?)
    }

    /// A user a token points at, provided they still exist and are active.
    async fn active_user(&self, user_id: Uuid) -> Result<User, AppError> {
        let user = self.users.get_by_id(user_id).await.map_err(|e| match e {
            DatabaseError::NotFound(_) => AppError::from(AuthError::InvalidAuthenticationToken),
            other => other.into(),
        })?;

        if !user.is_active() {
            tracing::warn!(user_id = %user_id, "Token presented for inactive account");
            return Err(AuthError::InvalidAuthenticationToken.into());
        }
        Ok(user)
    }

    async fn issue_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = self.codec.mint_access(user.id, user.role, self.config.access_ttl)?;
        let refresh = mint_opaque();
        let record = RefreshTokenRecord {
            user_id: user.id,
            scope: TokenScope::Refresh,
            hash: refresh.hash,
            expires_at: Utc::now() + self.config.refresh_ttl,
        };

        self.tokens.rotate(&record).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh.plaintext,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_ttl.num_seconds(),
            refresh_expires_at: record.expires_at,
        })
    }
}
