use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::config::WebConfig;

use super::api::create_router;

pub fn app() -> Router {
    create_router().layer(TraceLayer::new_for_http())
}

/// Serve the liveness routes until `shutdown_rx` turns true
pub async fn run_server(
    web_config: WebConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(&web_config.listen).await?;
    tracing::info!("Web server listening on {}", web_config.listen);

    axum::serve(listener, app())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            tracing::info!("Web server shutting down gracefully");
        })
        .await?;

    Ok(())
}
