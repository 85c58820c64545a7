/// Error Handling Module
///
/// Every failure in the service maps onto `AppError`:
/// 1. Domain-specific error enums (validation, storage, auth, config)
/// 2. `From` conversions used for `?` propagation
/// 3. HTTP response mapping with a uniform body shape
/// 4. Structured error logging with request context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use crate::auth::TokenError;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Field name -> human readable reason.
pub type FieldErrors = BTreeMap<String, String>;

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
    /// Request body could not be decoded at all.
    MalformedBody(String),
    /// One or more fields failed validation; all failures are reported together.
    Failed(FieldErrors),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} must be provided", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} must be at least {} bytes long", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} must not be more than {} bytes long", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::MalformedBody(msg) => write!(f, "malformed request body: {}", msg),
            ValidationError::Failed(fields) => {
                write!(f, "validation failed for {} field(s)", fields.len())
            }
        }
    }
}

impl StdError for ValidationError {}

/// Storage errors. `DuplicateLogin` is kept apart from generic failures so the
/// registration handler can answer with a distinct response.
#[derive(Debug)]
pub enum DatabaseError {
    DuplicateLogin,
    NotFound(String),
    Timeout,
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::DuplicateLogin => write!(f, "a user with this login already exists"),
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::Timeout => write!(f, "Storage operation timed out"),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication and authorization errors
#[derive(Debug)]
pub enum AuthError {
    /// Unknown login or wrong secret. Never says which.
    InvalidCredentials,
    /// Missing, malformed, unknown, expired or reused bearer token.
    InvalidAuthenticationToken,
    /// Access token failed verification; kept for logs, rendered like
    /// `InvalidAuthenticationToken`.
    Token(TokenError),
    AccountInactive,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::InvalidAuthenticationToken => write!(f, "Invalid authentication token"),
            AuthError::Token(e) => write!(f, "Invalid authentication token: {}", e),
            AuthError::AccountInactive => write!(f, "Account is inactive"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Auth(AuthError),
    Config(ConfigError),
    /// A blocking operation outside storage (secret hashing) ran past its deadline.
    Timeout(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Timeout(op) => write!(f, "{} timed out", op),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    /// True for every failure a client sees as "invalid authentication token".
    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self,
            AppError::Auth(AuthError::InvalidAuthenticationToken) | AppError::Auth(AuthError::Token(_))
        )
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Auth(AuthError::Token(err))
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(DatabaseError::from(err))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                unique_violation(db.constraint(), db.message())
            }
            sqlx::Error::PoolTimedOut => DatabaseError::Timeout,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionPool(err.to_string())
            }
            other => DatabaseError::UnexpectedError(other.to_string()),
        }
    }
}

/// Postgres SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Unique constraint on `users.login` (see migrations).
pub const LOGIN_UNIQUE_CONSTRAINT: &str = "users_login_key";

/// Only a clash on the login column is a duplicate registration; any other
/// unique violation is a storage fault.
pub fn unique_violation(constraint: Option<&str>, message: &str) -> DatabaseError {
    match constraint {
        Some(LOGIN_UNIQUE_CONSTRAINT) => DatabaseError::DuplicateLogin,
        _ => DatabaseError::QueryExecution(message.to_string()),
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error body. Same shape for every failure so clients cannot tell rejections
/// apart by structure.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    pub message: String,
    pub code: String,
    pub status: u16,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            fields: None,
        }
    }

    pub fn with_fields(mut self, fields: FieldErrors) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(ValidationError::Failed(_)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_FAILED",
                "One or more fields are invalid".to_string(),
            ),
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string()),

            AppError::Database(e) => match e {
                DatabaseError::DuplicateLogin => {
                    (StatusCode::BAD_REQUEST, "DUPLICATE_LOGIN", e.to_string())
                }
                DatabaseError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "The requested resource could not be found".to_string(),
                ),
                DatabaseError::Timeout => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "TIMEOUT",
                    "The server took too long to respond".to_string(),
                ),
                DatabaseError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                ),
            },

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "invalid authentication credentials".to_string(),
                ),
                AuthError::InvalidAuthenticationToken | AuthError::Token(_) => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_AUTHENTICATION_TOKEN",
                    "invalid or missing authentication token".to_string(),
                ),
                AuthError::AccountInactive => (
                    StatusCode::FORBIDDEN,
                    "ACCOUNT_INACTIVE",
                    "Account is inactive".to_string(),
                ),
            },

            AppError::Timeout(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "TIMEOUT",
                "The server took too long to respond".to_string(),
            ),

            AppError::Config(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let mut error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );
        if let AppError::Validation(ValidationError::Failed(fields)) = self {
            error_response = error_response.with_fields(fields.clone());
        }

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Database(DatabaseError::DuplicateLogin) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate login attempt");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(request_id = request_id, "Invalid credentials attempt");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Timeout(op) => {
                tracing::error!(request_id = request_id, operation = %op, "Deadline exceeded");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        <Self as ErrorHandler>::error_response(self, "").0
    }
}

// ============================================================================
// 4. FIELD VALIDATION COLLECTOR
// ============================================================================

/// Collects field-level failures so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first failure seen for each field.
    pub fn check<T>(&mut self, result: Result<T, ValidationError>, field: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.entry(field.to_string()).or_insert_with(|| e.to_string());
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(ValidationError::Failed(self.errors)))
        }
    }
}

// ============================================================================
// 5. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Per-operation context attached to lifecycle log lines
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl ToString) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) | AppError::Auth(_) => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            AppError::Database(DatabaseError::DuplicateLogin) => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            _ => {
                tracing::error!(error = %error, context = ?context, "Operation failed");
            }
        }
    }
}
