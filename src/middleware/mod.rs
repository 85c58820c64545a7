/// Middleware module
///
/// Request-time authorization.

mod auth_gate;

pub use auth_gate::{parse_bearer, resolve_identity, AuthGate, GateMode};
