use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::router::appointment_routes;
use availability_cell::router::availability_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/appointments", appointment_routes(state))
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "Novadent Clinic API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
