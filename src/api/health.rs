//! Actuator endpoints

use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub app: AppInfo,
}

/// Liveness probe. The process answering is the only check; Keycloak
/// reachability is not part of it.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "UP".to_string(),
    })
}

/// Build information
pub async fn info() -> impl IntoResponse {
    Json(InfoResponse {
        app: AppInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: env!("CARGO_PKG_DESCRIPTION").to_string(),
        },
    })
}
