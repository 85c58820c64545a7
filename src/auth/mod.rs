/// Authentication module
///
/// Credential hashing, signed access tokens and opaque refresh tokens.

mod claims;
mod jwt;
mod password;
mod refresh_token;

pub use claims::Claims;
pub use jwt::{TokenCodec, TokenError};
pub use password::{
    hash_password, hash_password_blocking, verify_password, verify_password_blocking,
    DEFAULT_HASH_COST,
};
pub use refresh_token::{classify, hash_token, mint_opaque, BearerKind, OpaqueToken, REFRESH_TOKEN_PREFIX};
