// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::guard::CalendarGuard;

/// Router-wide state. The guard must outlive single requests so concurrent
/// bookings against one dentist contend on the same lock.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub guard: CalendarGuard,
}

pub fn appointment_routes(config: Arc<AppConfig>) -> Router {
    let state = AppointmentState {
        config: config.clone(),
        guard: CalendarGuard::new(),
    };

    Router::new()
        .route("/reserve", post(handlers::reserve_appointment))
        .route("/search", get(handlers::search_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).patch(handlers::update_appointment),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
