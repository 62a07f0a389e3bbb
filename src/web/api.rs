use axum::{routing::get, Router};

/// Body returned by the liveness routes
pub const LIVENESS_MESSAGE: &str = "footfall is running";

pub fn create_router() -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
}

pub async fn health_check() -> &'static str {
    LIVENESS_MESSAGE
}
