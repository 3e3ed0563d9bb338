use axum::Json;
use serde::Serialize;

use crate::config::APP_VERSION;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: APP_VERSION,
    })
}
