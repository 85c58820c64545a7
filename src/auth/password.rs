/// Credential verification
///
/// Salted bcrypt hashing with a fixed work factor. Hashing is CPU bound, so the
/// async entry points run it on the blocking pool under a deadline.

use bcrypt::{hash, verify};
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_HASH_COST: u32 = 12;

/// Hash a secret using bcrypt
///
/// # Errors
/// Returns `AppError::Internal` if bcrypt rejects the cost or input
pub fn hash_password(secret: &str, cost: u32) -> Result<String, AppError> {
    hash(secret, cost).map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a secret against a stored hash.
///
/// Any bcrypt failure, including an unparseable hash, reads as a mismatch.
pub fn verify_password(secret: &str, hash: &str) -> bool {
    match verify(secret, hash) {
        Ok(matched) => matched,
        Err(e) => {
            tracing::warn!("Password verification failed: {}", e);
            false
        }
    }
}

pub async fn hash_password_blocking(
    secret: String,
    cost: u32,
    deadline: Duration,
) -> Result<String, AppError> {
    let task = tokio::task::spawn_blocking(move || hash_password(&secret, cost));
    match tokio::time::timeout(deadline, task).await {
        Ok(joined) => joined.map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?,
        Err(_) => Err(AppError::Timeout("password hashing".to_string())),
    }
}

pub async fn verify_password_blocking(
    secret: String,
    hash: String,
    deadline: Duration,
) -> Result<bool, AppError> {
    let task = tokio::task::spawn_blocking(move || verify_password(&secret, &hash));
    match tokio::time::timeout(deadline, task).await {
        Ok(joined) => {
            joined.map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))
        }
        Err(_) => Err(AppError::Timeout("password verification".to_string())),
    }
}
