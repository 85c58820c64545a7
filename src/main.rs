use authsession::configuration::get_configuration;
use authsession::startup::{build_session, run, Stores};
use authsession::telemetry::init_telemetry;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!(backend = ?configuration.storage.backend, "Opening storage");
    let stores = Stores::from_settings(&configuration).await.map_err(|e| {
        tracing::error!("Failed to open storage: {}", e);
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Storage error")
    })?;

    let session = build_session(&configuration, stores).map_err(|e| {
        tracing::error!("Failed to build session manager: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Session setup error")
    })?;

    let session = Arc::new(session);
    let purger = session.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = purger.purge_expired().await {
                tracing::warn!("Failed to purge expired tokens: {}", e);
            }
        }
    });

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, session)?;
    server.await
}
