use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{sse::Event as SseEvent, Html, IntoResponse, Json, Response, Sse},
};
use chrono::{DateTime, Utc};
use rust_embed::RustEmbed;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, warn};

use super::events::StreamEvent;
use super::state::AppState;
use crate::constants::{HEARTBEAT_SECS, KEEPALIVE_SECS};
use crate::dataset::{DatasetError, MineTable};
use crate::figure::DisplayConfig;
use crate::interaction::{self, InteractionError, MapEvent};
use crate::page::{self, PageConfig, PageError, PageView, ViewRequest};

#[derive(RustEmbed)]
#[folder = "frontend/"]
struct Asset;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Interaction(#[from] InteractionError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Page(_) | ApiError::Interaction(_) => StatusCode::BAD_REQUEST,
            ApiError::Dataset(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        let body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// Reads the workbook on the blocking pool.
async fn load_table(state: &AppState) -> Result<Arc<MineTable>, ApiError> {
    let store = state.store.clone();
    let table = tokio::task::spawn_blocking(move || store.load()).await??;
    Ok(table)
}

fn embedded(path: &str, content_type: &'static str) -> Response {
    match Asset::get(path) {
        Some(file) => ([(header::CONTENT_TYPE, content_type)], file.data.into_owned()).into_response(),
        None => {
            error!("Embedded asset missing: {}", path);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

pub async fn index_html() -> Response {
    match Asset::get("index.html") {
        Some(file) => Html(file.data.into_owned()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn style_css() -> Response {
    embedded("style.css", "text/css")
}

pub async fn script_js() -> Response {
    embedded("script.js", "application/javascript")
}

// API endpoint for the page chrome with default widget values
pub async fn get_page(State(state): State<AppState>) -> Result<Json<PageConfig>, ApiError> {
    let table = load_table(&state).await?;
    Ok(Json(page::page_config(&table, None, DisplayConfig::default())))
}

// API endpoint recomputing the map from the current widget values
pub async fn post_view(
    State(state): State<AppState>,
    Json(request): Json<ViewRequest>,
) -> Result<Json<PageView>, ApiError> {
    let table = load_table(&state).await?;
    let view = page::render_view(&table, &request)?;
    debug!(
        points = view.figure.points().count(),
        total = view.total_rows,
        height = view.display.height,
        marker_size = view.display.marker_size,
        "Rendered view"
    );
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
pub struct DatasetSummary {
    pub source: String,
    pub sheet: String,
    pub rows: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

pub async fn get_dataset(State(state): State<AppState>) -> Result<Json<DatasetSummary>, ApiError> {
    let table = load_table(&state).await?;
    Ok(Json(DatasetSummary {
        source: state.store.describe(),
        sheet: table.sheet.clone(),
        rows: table.len(),
        skipped: table.warnings.len(),
        warnings: table.warnings.clone(),
        loaded_at: table.loaded_at,
    }))
}

// API endpoint receiving click/select events from the map
pub async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<MapEvent>,
) -> Result<impl IntoResponse, ApiError> {
    interaction::dispatch(&state.subscriptions, state.selection_handler.as_ref(), &event)?;

    // No listeners is fine
    let _ = state.event_sender.send(StreamEvent::from_map_event(&event));

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "accepted",
            "points": event.points.len(),
        })),
    ))
}

// SSE stream of accepted map events
pub async fn map_events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let mut event_receiver = state.event_sender.subscribe();
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                event = event_receiver.recv() => match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE listener lagging");
                        continue;
                    }
                    Err(_) => break, // Channel closed
                },
                _ = tokio::time::sleep(Duration::from_secs(HEARTBEAT_SECS)) => StreamEvent::heartbeat(),
            };

            let sse_event = SseEvent::default()
                .json_data(&next)
                .unwrap_or_else(|_| SseEvent::default().data("Error serializing event"));

            if tx.send(Ok(sse_event)).await.is_err() {
                break; // Client disconnected
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(KEEPALIVE_SECS))
            .text("keepalive-message"),
    )
}
