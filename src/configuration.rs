use secrecy::{ExposeSecret, SecretString};
use serde::Deserializer;
use std::time::Duration;

use crate::auth::DEFAULT_HASH_COST;
use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub storage: StorageSettings,
    pub jwt: JwtSettings,
    pub auth: AuthSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "{}/{}",
            self.connection_string_without_db(),
            self.database_name
        )
    }

    /// Server-level connection, used to create databases.
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username,
            self.password.expose_secret(),
            self.host,
            self.port
        )
    }
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(serde::Deserialize, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Deadline for every storage call and every secret hash.
    pub timeout_milliseconds: u64,
}

impl StorageSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret: SecretString,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

impl JwtSettings {
    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_expiry)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_expiry)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct AuthSettings {
    /// bcrypt work factor
    pub hash_cost: u32,
}

impl Settings {
    /// Reject settings the service must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.expose_secret().len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if self.jwt.issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.issuer".to_string()));
        }
        if self.jwt.access_token_expiry <= 0 || self.jwt.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiries must be positive".to_string(),
            ));
        }
        if self.jwt.access_token_expiry >= self.jwt.refresh_token_expiry {
            return Err(ConfigError::InvalidValue(
                "access_token_expiry must be shorter than refresh_token_expiry".to_string(),
            ));
        }
        if !(4..=31).contains(&self.auth.hash_cost) {
            return Err(ConfigError::InvalidValue(
                "auth.hash_cost must be between 4 and 31".to_string(),
            ));
        }
        if self.storage.timeout_milliseconds == 0 {
            return Err(ConfigError::InvalidValue(
                "storage.timeout_milliseconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: String = serde::Deserialize::deserialize(deserializer)?;
    Ok(SecretString::from(raw))
}

/// Layered configuration: built-in defaults, then `configuration.yaml`, then
/// `APP_*` environment variables (`APP_JWT__SECRET`, `APP_STORAGE__BACKEND`, ...).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")
        .and_then(|b| b.set_default("application.port", 8080))
        .and_then(|b| b.set_default("database.host", "localhost"))
        .and_then(|b| b.set_default("database.port", 5432))
        .and_then(|b| b.set_default("database.username", "postgres"))
        .and_then(|b| b.set_default("database.password", "password"))
        .and_then(|b| b.set_default("database.database_name", "auth"))
        .and_then(|b| b.set_default("database.max_connections", 5))
        .and_then(|b| b.set_default("storage.backend", "postgres"))
        .and_then(|b| b.set_default("storage.timeout_milliseconds", 3000))
        .and_then(|b| b.set_default("jwt.issuer", "authsession"))
        .and_then(|b| b.set_default("jwt.access_token_expiry", 900))
        .and_then(|b| b.set_default("jwt.refresh_token_expiry", 604800))
        .and_then(|b| b.set_default("auth.hash_cost", DEFAULT_HASH_COST as i64))
        .map_err(|e| ConfigError::ParseError(e.to_string()))?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let settings = settings
        .try_deserialize::<Settings>()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    settings.validate()?;

    Ok(settings)
}
