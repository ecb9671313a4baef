//! Health check endpoint.

use actix_web::{HttpResponse, web};
use serde::Serialize;

use tollgate_infra::EventCounts;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub backend: &'static str,
    pub plans: Vec<String>,
    pub events: EventCounts,
}

/// Health check endpoint - returns server status and decision counters.
///
/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        backend: state.backend,
        plans: state.registry.names(),
        events: state.counters.snapshot(),
    };

    HttpResponse::Ok().json(response)
}
