use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod events;
pub mod handlers;
pub mod state;

pub use self::state::AppState;
use handlers::{
    get_dataset, get_page, index_html, map_events_stream, post_event, post_view, script_js,
    style_css,
};

// Create the main application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_html))
        .route("/style.css", get(style_css))
        .route("/script.js", get(script_js))
        .route("/api/page", get(get_page))
        .route("/api/view", post(post_view))
        .route("/api/dataset", get(get_dataset))
        .route("/api/events", post(post_event))
        .route("/api/events/stream", get(map_events_stream))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = create_app(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server started at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
