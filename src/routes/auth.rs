/// Authentication Routes
///
/// Registration, login, token refresh, logout and current user information.

use actix_web::{web, HttpResponse};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AuthError};
use crate::models::{AuthenticatedUser, Credential, Identity, Role, User, UserStatus};
use crate::session::{Registration, SessionManager};

/// User registration request
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub login: String,
    #[serde(alias = "password")]
    pub secret: String,
    pub name: String,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

/// User login request
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    #[serde(alias = "password")]
    pub secret: String,
}

/// User information response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub login: String,
    pub name: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            login: user.login,
            name: user.name,
            role: user.role,
            status: user.status,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// The authenticated user behind an access token, or a uniform rejection.
fn require_access(identity: &Identity) -> Result<&AuthenticatedUser, AppError> {
    match identity {
        Identity::User(user) if matches!(user.credential, Credential::Access) => Ok(user),
        _ => Err(AuthError::InvalidAuthenticationToken.into()),
    }
}

/// POST /auth/register
///
/// # Errors
/// - 400: Malformed body, or login already taken (`DUPLICATE_LOGIN`)
/// - 422: Field validation errors
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    session: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let user = session
        .register(Registration {
            login: form.login,
            secret: form.secret,
            name: form.name,
            role: form.role,
            status: form.status,
        })
        .await?;

    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/// POST /auth/login
///
/// Returns a fresh access/refresh pair; any earlier refresh token of the
/// user stops working.
///
/// # Errors
/// - 401: Invalid credentials (same body for unknown login and wrong secret)
/// - 403: Account is inactive
pub async fn login(
    form: web::Json<LoginRequest>,
    session: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let pair = session.login(&form.login, &form.secret).await?;

    Ok(HttpResponse::Created().json(pair))
}

/// GET /auth/refresh
///
/// **Requires a refresh token** as bearer. Rotates it: the presented token is
/// consumed and a new pair is returned.
///
/// # Errors
/// - 401: Missing, unknown, expired or already used refresh token
pub async fn refresh(
    identity: web::ReqData<Identity>,
    session: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let presented = match &*identity {
        Identity::User(AuthenticatedUser {
            credential: Credential::Refresh(secret),
            ..
        }) => secret.clone(),
        _ => return Err(AuthError::InvalidAuthenticationToken.into()),
    };

    let pair = session.refresh(presented.expose_secret()).await?;

    Ok(HttpResponse::Created().json(pair))
}

/// GET /auth/logout
///
/// **Requires a valid access token.** Deletes every refresh token of the user.
pub async fn logout(
    identity: web::ReqData<Identity>,
    session: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let user = require_access(&identity)?;
    session.logout(user.user_id).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "user logged out".to_string(),
    }))
}

/// GET /auth/me
///
/// **Requires a valid access token.**
pub async fn get_current_user(
    identity: web::ReqData<Identity>,
    session: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let user = require_access(&identity)?;
    let user = session.current_user(user.user_id).await?;

    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_password_alias_is_accepted() {
        let form: LoginRequest =
            serde_json::from_value(json!({ "login": "alice1", "password": "password1" })).unwrap();
        assert_eq!(form.secret, "password1");

        let form: RegisterRequest = serde_json::from_value(json!({
            "login": "alice1",
            "password": "password1",
            "name": "Alice",
            "role": "admin"
        }))
        .unwrap();
        assert_eq!(form.secret, "password1");
        assert_eq!(form.role, Some(Role::Admin));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let login = serde_json::from_value::<LoginRequest>(json!({
            "login": "alice1",
            "secret": "password1",
            "remember": true
        }));
        assert!(login.is_err());

        let register = serde_json::from_value::<RegisterRequest>(json!({
            "login": "alice1",
            "secret": "password1",
            "name": "Alice",
            "email": "alice@example.com"
        }));
        assert!(register.is_err());
    }
}
