//! HTTP route handlers for the PDF watermark service.
//!
//! All routes return either JSON (health, errors) or binary data (PDF, ZIP).

mod download;
mod health;
mod watermark;

pub use health::health;
pub use watermark::watermark_pdf;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let max_upload = state.config.server.max_upload_bytes();

    Router::new()
        .route("/health", get(health))
        .route("/api/watermark", post(watermark_pdf))
        // Middleware
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
