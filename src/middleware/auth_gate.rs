/// Authorization gate
///
/// Resolves the `Authorization` header of a request to an `Identity` and hands
/// it to the handler through request extensions. Runs once per request and is
/// never cached.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderValue, AUTHORIZATION, VARY},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use secrecy::SecretString;
use std::rc::Rc;

use crate::auth::{classify, BearerKind};
use crate::error::{AppError, AuthError};
use crate::models::{AuthenticatedUser, Credential, Identity};
use crate::session::SessionManager;

/// Which credentials an endpoint accepts besides access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    Access,
    /// Also resolve opaque refresh tokens through the token store.
    Refresh,
}

/// Extract `<token>` from `Bearer <token>`.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Resolve a raw `Authorization` header value.
///
/// - no header: `Identity::Anonymous`
/// - not `Bearer <token>`: rejected
/// - access token: verified from its signature and claims alone
/// - refresh token (refresh endpoints only): looked up in the token store
pub async fn resolve_identity(
    header: Option<&str>,
    mode: GateMode,
    session: &SessionManager,
) -> Result<Identity, AppError> {
    let header = match header {
        None => return Ok(Identity::Anonymous),
        Some(value) => value,
    };

    let token = parse_bearer(header).ok_or(AuthError::InvalidAuthenticationToken)?;

    match (classify(token), mode) {
        (BearerKind::Access, _) => {
            let claims = session.codec().parse_and_verify(token)?;
            Ok(Identity::User(AuthenticatedUser {
                user_id: claims.user_id()?,
                role: claims.role,
                credential: Credential::Access,
            }))
        }
        (BearerKind::Refresh, GateMode::Refresh) => {
            let user = session.resolve_refresh_token(token).await?;
            Ok(Identity::User(AuthenticatedUser {
                user_id: user.id,
                role: user.role,
                credential: Credential::Refresh(SecretString::from(token.to_string())),
            }))
        }
        (BearerKind::Refresh, GateMode::Access) => Err(AuthError::InvalidAuthenticationToken.into()),
    }
}

pub struct AuthGate {
    mode: GateMode,
}

impl AuthGate {
    pub fn access() -> Self {
        Self { mode: GateMode::Access }
    }

    pub fn refresh() -> Self {
        Self { mode: GateMode::Refresh }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGateService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthGateService {
            service: Rc::new(service),
            mode: self.mode,
        }))
    }
}

pub struct AuthGateService<S> {
    service: Rc<S>,
    mode: GateMode,
}

impl<S, B> Service<ServiceRequest> for AuthGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let mode = self.mode;

        Box::pin(async move {
            let identity = match identify(&req, mode).await {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(path = %req.path(), error = %e, "Authorization rejected");
                    let mut res = req.error_response(e);
                    vary_on_authorization(res.headers_mut());
                    return Ok(res.map_into_right_body());
                }
            };

            if let Identity::User(user) = &identity {
                tracing::debug!(user_id = %user.user_id, "Request authenticated");
            }
            req.extensions_mut().insert(identity);

            let mut res = service.call(req).await?;
            vary_on_authorization(res.headers_mut());
            Ok(res.map_into_left_body())
        })
    }
}

/// Responses depend on the bearer token, so shared caches must key on it.
fn vary_on_authorization(headers: &mut actix_web::http::header::HeaderMap) {
    headers.insert(VARY, HeaderValue::from_static("Authorization"));
}

async fn identify(req: &ServiceRequest, mode: GateMode) -> Result<Identity, AppError> {
    let session = req
        .app_data::<web::Data<SessionManager>>()
        .cloned()
        .ok_or_else(|| AppError::Internal("session manager not configured".to_string()))?;

    // A header that is not valid visible ASCII cannot be a bearer token.
    let header = match req.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| AppError::from(AuthError::InvalidAuthenticationToken))?
                .to_string(),
        ),
    };

    resolve_identity(header.as_deref(), mode, &session).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{alice, test_manager};
    use crate::models::Role;
    use uuid::Uuid;

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("bearer abc"), None);
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer abc def"), None);
    }

    #[tokio::test]
    async fn test_no_header_is_anonymous() {
        let (manager, _) = test_manager();
        let identity = resolve_identity(None, GateMode::Access, &manager).await.unwrap();
        assert!(identity.is_anonymous());
    }

    #[tokio::test]
    async fn test_wrong_scheme_rejected() {
        let (manager, _) = test_manager();
        let result = resolve_identity(Some("Token abc"), GateMode::Access, &manager).await;
        assert!(result.unwrap_err().is_invalid_token());
    }

    #[tokio::test]
    async fn test_access_token_resolves_without_store() {
        let (manager, _) = test_manager();
        let user_id = Uuid::new_v4();
        let token = manager
            .codec()
            .mint_access(user_id, Role::Admin, chrono::Duration::minutes(5))
            .unwrap();

        let header = format!("Bearer {}", token);
        let identity = resolve_identity(Some(&header), GateMode::Access, &manager)
            .await
            .unwrap();

        match identity {
            Identity::User(user) => {
                assert_eq!(user.user_id, user_id);
                assert_eq!(user.role, Role::Admin);
                assert!(matches!(user.credential, Credential::Access));
            }
            Identity::Anonymous => panic!("Expected authenticated user"),
        }
    }

    #[tokio::test]
    async fn test_expired_access_token_rejected() {
        let (manager, _) = test_manager();
        let token = manager
            .codec()
            .mint_access(Uuid::new_v4(), Role::User, chrono::Duration::seconds(-1))
            .unwrap();

        let header = format!("Bearer {}", token);
        for mode in [GateMode::Access, GateMode::Refresh] {
            let result = resolve_identity(Some(&header), mode, &manager).await;
            assert!(result.unwrap_err().is_invalid_token());
        }
    }

    #[tokio::test]
    async fn test_refresh_token_only_accepted_in_refresh_mode() {
        let (manager, _) = test_manager();
        let user = manager.register(alice()).await.unwrap();
        let pair = manager.login("alice1", "password1").await.unwrap();
        let header = format!("Bearer {}", pair.refresh_token);

        let rejected = resolve_identity(Some(&header), GateMode::Access, &manager).await;
        assert!(rejected.unwrap_err().is_invalid_token());

        let identity = resolve_identity(Some(&header), GateMode::Refresh, &manager)
            .await
            .unwrap();
        assert_eq!(identity.user_id(), Some(user.id));
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_rejected() {
        let (manager, _) = test_manager();
        let header = format!("Bearer {}", crate::auth::mint_opaque().plaintext);

        let result = resolve_identity(Some(&header), GateMode::Refresh, &manager).await;
        assert!(result.unwrap_err().is_invalid_token());
    }
}
