pub mod dto;
pub mod errors;
pub mod handlers;
pub mod ws;

use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{broadcast::Broadcaster, control::ControlService, store::EventStore};
use handlers::ApiDoc;

/// Shared handles passed to every handler. All fields are cheap clones over
/// `Arc`-backed state.
#[derive(Clone)]
pub struct AppState {
    pub store: EventStore,
    pub control: ControlService,
    pub broadcaster: Broadcaster,
}

impl AppState {
    pub fn new(subscriber_buffer: usize, command_lock_timeout: Duration) -> Self {
        let broadcaster = Broadcaster::new(subscriber_buffer);
        let store = EventStore::new(broadcaster.clone());
        let control = ControlService::new(store.clone(), command_lock_timeout);
        Self {
            store,
            control,
            broadcaster,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/api/sensors",
            post(handlers::submit_reading)
                .get(handlers::get_readings)
                .delete(handlers::delete_all_readings),
        )
        .route("/api/sensors/latest", get(handlers::get_latest_reading))
        .route("/api/sensors/statistics", get(handlers::get_statistics))
        .route("/api/sensors/old", delete(handlers::purge_old_readings))
        .route("/api/actuators", post(handlers::post_actuator_command))
        .route("/api/actuators/states", get(handlers::get_actuator_states))
        .route("/api/actuators/history", get(handlers::get_actuator_history))
        .route(
            "/api/actuators/{device_type}/latest",
            get(handlers::get_actuator_latest),
        )
        .route("/api/system/status", get(handlers::get_system_status))
        .route("/api/system/dashboard", get(handlers::get_dashboard))
        .with_state(state.clone())
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route("/ws", get(ws::ws_handler).with_state(state))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
