/// Opaque refresh tokens
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character alphanumeric strings
/// - Prefixed with `rtk_` so a bearer value announces its own kind
/// - Hashed with SHA-256 before storage (never store plaintext)

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use std::fmt;

pub const REFRESH_TOKEN_PREFIX: &str = "rtk_";
const REFRESH_TOKEN_RANDOM_LEN: usize = 64;

/// Freshly minted refresh token. The plaintext goes to the client exactly once;
/// only `hash` is ever stored.
pub struct OpaqueToken {
    pub plaintext: String,
    pub hash: String,
}

impl fmt::Debug for OpaqueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueToken")
            .field("plaintext", &"[REDACTED]")
            .field("hash", &self.hash)
            .finish()
    }
}

/// Generate a new refresh token and its storage hash.
pub fn mint_opaque() -> OpaqueToken {
    let random: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_RANDOM_LEN)
        .map(char::from)
        .collect();
    let plaintext = format!("{}{}", REFRESH_TOKEN_PREFIX, random);
    let hash = hash_token(&plaintext);

    OpaqueToken { plaintext, hash }
}

/// SHA-256 of a presented token, hex encoded.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Kind of credential a bearer value claims to be, judged by shape alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BearerKind {
    Access,
    Refresh,
}

pub fn classify(token: &str) -> BearerKind {
    if token.starts_with(REFRESH_TOKEN_PREFIX) {
        BearerKind::Refresh
    } else {
        BearerKind::Access
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_opaque() {
        let token = mint_opaque();

        assert!(token.plaintext.starts_with(REFRESH_TOKEN_PREFIX));
        assert_eq!(token.plaintext.len(), REFRESH_TOKEN_PREFIX.len() + 64);
        assert!(token.plaintext[REFRESH_TOKEN_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(token.hash, hash_token(&token.plaintext));
    }

    #[test]
    fn test_token_hashing() {
        let token = mint_opaque();
        let hash = hash_token(&token.plaintext);

        assert_ne!(token.plaintext, hash);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        let first = mint_opaque();
        let second = mint_opaque();

        assert_ne!(first.plaintext, second.plaintext);
        assert_ne!(first.hash, second.hash);
    }

    #[test]
    fn test_debug_redacts_plaintext() {
        let token = mint_opaque();
        let debug = format!("{:?}", token);
        assert!(!debug.contains(&token.plaintext));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&mint_opaque().plaintext), BearerKind::Refresh);
        assert_eq!(classify("eyJhbGciOiJIUzI1NiJ9.e30.sig"), BearerKind::Access);
        assert_eq!(classify("rtk"), BearerKind::Access);
    }
}
