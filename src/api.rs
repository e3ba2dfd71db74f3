//! HTTP API endpoints.
//!
//! Read-only endpoints for displays and the host panel. All mutations go
//! through the host WebSocket.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path as FsPath;
use std::sync::Arc;

use crate::state::view::SessionView;
use crate::state::AppState;
use crate::types::Phase;

/// 1x1 transparent GIF served when a rank has no image
const PLACEHOLDER_GIF: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

/// Current session snapshot.
///
/// GET /api/session
pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.view().await)
}

/// Raw catalog text, for editing in the host panel.
///
/// GET /api/config
///
/// Only available while no session is running.
pub async fn get_config(State(state): State<Arc<AppState>>) -> Response {
    let phase = state.phase().await;
    if phase != Phase::Idle {
        return (
            StatusCode::CONFLICT,
            format!("Catalog is locked during {:?}", phase),
        )
            .into_response();
    }

    match state.catalog_store.read_blob().await {
        Ok(blob) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            blob,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to read catalog: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read catalog: {}", e),
            )
                .into_response()
        }
    }
}

/// Image for a rank of the clip in play.
///
/// GET /rank/{label}
pub async fn get_rank_image(
    State(state): State<Arc<AppState>>,
    Path(label): Path<String>,
) -> Response {
    let Some(rank) = state.find_rank(&label).await else {
        return (StatusCode::NOT_FOUND, "Unknown rank").into_response();
    };

    if let Some(path) = &rank.image {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                return (
                    [(header::CONTENT_TYPE, content_type_for(path))],
                    Body::from(bytes),
                )
                    .into_response();
            }
            Err(e) => {
                tracing::warn!(
                    "Image for rank {} missing at {}: {}",
                    rank.label,
                    path.display(),
                    e
                );
            }
        }
    }

    placeholder_image()
}

fn placeholder_image() -> Response {
    match STANDARD.decode(PLACEHOLDER_GIF) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/gif")], Body::from(bytes)).into_response(),
        Err(e) => {
            tracing::error!("Placeholder image is not valid base64: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
