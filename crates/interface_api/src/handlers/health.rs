//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};

use core_kernel::AdapterHealth;

use crate::dto::health::HealthResponse;
use crate::AppState;

/// Liveness check
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::new("healthy", Vec::new()))
}

/// Readiness check across every registered adapter
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = Vec::with_capacity(state.health.len());
    for adapter in state.health.iter() {
        checks.push(adapter.health_check().await);
    }

    if checks.iter().any(|c| c.status == AdapterHealth::Unhealthy) {
        tracing::warn!("readiness check failed");
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::new("unavailable", checks)))
    } else {
        (StatusCode::OK, Json(HealthResponse::new("ready", checks)))
    }
}
