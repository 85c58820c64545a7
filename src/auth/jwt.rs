/// Access token codec
///
/// Mints and verifies HS256-signed access tokens. The signing key is loaded
/// once from configuration and shared read-only for the life of the process.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::models::Role;

/// Why an access token was refused. Only ever logged; clients see one
/// uniform rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    InvalidSignature,
    Expired,
    Malformed,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::InvalidSignature => write!(f, "signature does not verify"),
            TokenError::Expired => write!(f, "token has expired"),
            TokenError::Malformed => write!(f, "token is malformed"),
        }
    }
}

impl std::error::Error for TokenError {}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings) -> Self {
        Self::from_secret(&config.secret, &config.issuer)
    }

    pub fn from_secret(secret: &SecretString, issuer: &str) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);
        // An access token is dead the second its exp passes.
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
            issuer: issuer.to_string(),
        }
    }

    /// Mint a signed access token for `user_id` valid for `ttl`.
    ///
    /// # Errors
    /// Returns `AppError::Internal` if encoding fails
    pub fn mint_access(
        &self,
        user_id: Uuid,
        role: Role,
        ttl: chrono::Duration,
    ) -> Result<String, AppError> {
        let claims = Claims::new(user_id, role, ttl, self.issuer.clone());

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify signature, expiry and structure, in that order. A token that
    /// passes is trusted without any store lookup.
    pub fn parse_and_verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?;

        if claims.is_expired() {
            return Err(TokenError::Expired);
        }
        claims.ensure_complete()?;

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn get_test_codec() -> TokenCodec {
        TokenCodec::from_secret(
            &SecretString::from("test-secret-key-at-least-32-characters-long".to_string()),
            "test",
        )
    }

    #[test]
    fn test_mint_and_verify_token() {
        let codec = get_test_codec();
        let user_id = Uuid::new_v4();

        let token = codec
            .mint_access(user_id, Role::Admin, Duration::minutes(15))
            .expect("Failed to generate token");
        let claims = codec.parse_and_verify(&token).expect("Failed to validate token");

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_garbage_is_malformed() {
        let codec = get_test_codec();
        assert_eq!(codec.parse_and_verify("invalid.token.here"), Err(TokenError::Malformed));
        assert_eq!(codec.parse_and_verify(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_tampered_token() {
        let codec = get_test_codec();
        let token = codec
            .mint_access(Uuid::new_v4(), Role::User, Duration::minutes(15))
            .expect("Failed to generate token");

        // Replace the signature with one computed under another key.
        let other = TokenCodec::from_secret(
            &SecretString::from("another-secret-key-at-least-32-characters".to_string()),
            "test",
        );
        let forged_sig = other
            .mint_access(Uuid::new_v4(), Role::User, Duration::minutes(15))
            .unwrap()
            .rsplit('.')
            .next()
            .unwrap()
            .to_string();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[2] = &forged_sig;
        let tampered = parts.join(".");

        assert_eq!(codec.parse_and_verify(&tampered), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_expired_token_rejected() {
        let codec = get_test_codec();
        let token = codec
            .mint_access(Uuid::new_v4(), Role::User, Duration::seconds(-30))
            .expect("Failed to generate token");

        assert_eq!(codec.parse_and_verify(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_distinct_keys_do_not_verify_each_other() {
        let codec = get_test_codec();
        let other = TokenCodec::from_secret(
            &SecretString::from("another-secret-key-at-least-32-characters".to_string()),
            "test",
        );
        let token = other
            .mint_access(Uuid::new_v4(), Role::User, Duration::minutes(15))
            .unwrap();

        assert_eq!(codec.parse_and_verify(&token), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_wrong_issuer() {
        let codec = get_test_codec();
        let other_issuer = TokenCodec::from_secret(
            &SecretString::from("test-secret-key-at-least-32-characters-long".to_string()),
            "wrong-issuer",
        );
        let token = other_issuer
            .mint_access(Uuid::new_v4(), Role::User, Duration::minutes(15))
            .unwrap();

        assert_eq!(codec.parse_and_verify(&token), Err(TokenError::Malformed));
    }
}
