use actix_web::dev::Server;
use actix_web::{error::JsonPayloadError, middleware::Logger, web, App, HttpRequest, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::TokenCodec;
use crate::configuration::{Settings, StorageBackend};
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::AuthGate;
use crate::routes::{get_current_user, health_check, login, logout, refresh, register};
use crate::session::{SessionConfig, SessionManager};
use crate::store::{
    MemoryTokenStore, MemoryUserStore, PgTokenStore, PgUserStore, TokenStore, UserStore,
};

const MAX_JSON_PAYLOAD: usize = 4096;

pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new()),
            tokens: Arc::new(MemoryTokenStore::new()),
        }
    }

    /// Connect to Postgres and bring the schema up to date.
    pub async fn postgres(settings: &Settings) -> Result<Self, AppError> {
        let timeout = settings.storage.timeout();
        let pool = PgPoolOptions::new()
            .max_connections(settings.database.max_connections)
            .acquire_timeout(timeout)
            .connect(&settings.database.connection_string())
            .await?;
        tracing::info!("Database connection pool created successfully");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to migrate the database: {}", e)))?;

        Ok(Self {
            users: Arc::new(PgUserStore::new(pool.clone(), timeout)),
            tokens: Arc::new(PgTokenStore::new(pool, timeout)),
        })
    }

    pub async fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        match settings.storage.backend {
            StorageBackend::Postgres => Self::postgres(settings).await,
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; sessions will not survive a restart");
                Ok(Self::in_memory())
            }
        }
    }
}

/// Wire codec, stores and settings into a session manager.
pub fn build_session(settings: &Settings, stores: Stores) -> Result<SessionManager, AppError> {
    let codec = TokenCodec::new(&settings.jwt);
    SessionManager::new(
        stores.users,
        stores.tokens,
        Arc::new(codec),
        SessionConfig::from_settings(settings),
    )
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::from(ValidationError::MalformedBody(err.to_string())).into()
}

pub fn run(
    listener: TcpListener,
    session: impl Into<Arc<SessionManager>>,
) -> Result<Server, std::io::Error> {
    let session: Arc<SessionManager> = session.into();
    let session = web::Data::from(session);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(session.clone())
            .app_data(
                web::JsonConfig::default()
                    .limit(MAX_JSON_PAYLOAD)
                    .error_handler(json_error_handler),
            )

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))

            // Bearer = refresh token
            .service(
                web::resource("/auth/refresh")
                    .wrap(AuthGate::refresh())
                    .route(web::get().to(refresh)),
            )

            // Bearer = access token
            .service(
                web::resource("/auth/logout")
                    .wrap(AuthGate::access())
                    .route(web::get().to(logout)),
            )
            .service(
                web::resource("/auth/me")
                    .wrap(AuthGate::access())
                    .route(web::get().to(get_current_user)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
