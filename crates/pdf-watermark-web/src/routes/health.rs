//! Health check route.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    time: String,
}

/// Liveness probe. No side effects.
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        time: chrono::Utc::now().to_rfc3339(),
    })
}
