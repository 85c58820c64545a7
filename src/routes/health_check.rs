use actix_web::HttpResponse;

/// Liveness probe. Does not touch storage.
pub async fn health_check() -> HttpResponse {
    tracing::debug!("Health check endpoint called");
    HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-store"))
        .finish()
}
