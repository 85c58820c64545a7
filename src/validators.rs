/// Input validators for registration and login
///
/// 1. Length limits on every field (DoS protection, bcrypt input limit)
/// 2. Login handle character set
/// 3. Control-character rejection in display names

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MIN_LOGIN_LENGTH: usize = 5;
const MAX_LOGIN_LENGTH: usize = 64;
const MIN_SECRET_LENGTH: usize = 8;
const MAX_SECRET_LENGTH: usize = 72; // bcrypt ignores bytes past 72
const MAX_NAME_LENGTH: usize = 256;

lazy_static! {
    static ref LOGIN_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.@-]+$").unwrap();
}

/// Validates a login handle. Not trimmed or case-folded: logins are exact.
pub fn is_valid_login(login: &str) -> Result<String, ValidationError> {
    if login.is_empty() {
        return Err(ValidationError::EmptyField("login".to_string()));
    }

    if login.len() < MIN_LOGIN_LENGTH {
        return Err(ValidationError::TooShort("login".to_string(), MIN_LOGIN_LENGTH));
    }

    if login.len() > MAX_LOGIN_LENGTH {
        return Err(ValidationError::TooLong("login".to_string(), MAX_LOGIN_LENGTH));
    }

    if !LOGIN_REGEX.is_match(login) {
        return Err(ValidationError::InvalidFormat("login".to_string()));
    }

    Ok(login.to_string())
}

/// Validates a plaintext secret before it is hashed.
pub fn is_valid_secret(secret: &str) -> Result<(), ValidationError> {
    if secret.is_empty() {
        return Err(ValidationError::EmptyField("secret".to_string()));
    }

    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ValidationError::TooShort("secret".to_string(), MIN_SECRET_LENGTH));
    }

    if secret.len() > MAX_SECRET_LENGTH {
        return Err(ValidationError::TooLong("secret".to_string(), MAX_SECRET_LENGTH));
    }

    Ok(())
}

/// Validates a display name
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }

    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name".to_string(), MAX_NAME_LENGTH));
    }

    if has_suspicious_name_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("name".to_string()));
    }

    Ok(trimmed.to_string())
}

fn has_suspicious_name_patterns(name: &str) -> bool {
    // Null bytes and other control characters
    name.chars().any(|c| c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_login() {
        assert_eq!(is_valid_login("alice1").unwrap(), "alice1");
        assert!(is_valid_login("bob.smith@example.com").is_ok());
        assert!(is_valid_login("user_name-01").is_ok());
    }

    #[test]
    fn test_login_is_not_normalized() {
        assert_eq!(is_valid_login("Alice1").unwrap(), "Alice1");
        assert!(is_valid_login(" alice1").is_err());
    }

    #[test]
    fn test_login_length_limits() {
        assert!(matches!(is_valid_login(""), Err(ValidationError::EmptyField(_))));
        assert!(matches!(is_valid_login("abcd"), Err(ValidationError::TooShort(_, 5))));
        assert!(is_valid_login(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_login_charset() {
        assert!(is_valid_login("alice smith").is_err());
        assert!(is_valid_login("alice';--").is_err());
    }

    #[test]
    fn test_secret_length_limits() {
        assert!(is_valid_secret("password1").is_ok());
        assert!(is_valid_secret("").is_err());
        assert!(is_valid_secret("short").is_err());
        assert!(is_valid_secret(&"a".repeat(73)).is_err());
    }

    #[test]
    fn test_valid_name() {
        assert_eq!(is_valid_name("  Alice  ").unwrap(), "Alice");
        assert!(is_valid_name("Jean-Pierre").is_ok());
        assert!(is_valid_name("O'Brien").is_ok());
    }

    #[test]
    fn test_name_length_limits() {
        assert!(is_valid_name(&"a".repeat(257)).is_err());
        assert!(is_valid_name("   ").is_err());
    }

    #[test]
    fn test_control_characters() {
        assert!(is_valid_name("Name\0with\0null").is_err());
        assert!(is_valid_name("Name\u{7}").is_err());
    }
}
