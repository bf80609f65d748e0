use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use utoipa::OpenApi;

use super::{
    dto::{
        ActuatorCommandRequest, Dashboard, DeviceParams, HistoryParams, PurgeParams,
        RangeParams, StatsParams, StatsResponse, SubmitReadingRequest, SystemStatus,
        PurgeResponse,
    },
    errors::AppError,
    AppState,
};
use crate::{
    error::Error,
    stats::{self, ChannelStats, StatsReport},
    store::models::{
        ActuatorAction, ActuatorEvent, ActuatorKind, SensorEvent, TriggeredBy,
    },
};

// ---------------------------------------------------------------------------
// Sensor handlers
// ---------------------------------------------------------------------------

/// Ingest one environmental reading from the sensing unit.
#[utoipa::path(
    post,
    path = "/api/sensors",
    request_body = SubmitReadingRequest,
    responses(
        (status = 201, description = "Reading persisted and broadcast", body = SensorEvent),
        (status = 400, description = "Out-of-range or malformed reading"),
    ),
    tag = "sensors"
)]
pub async fn submit_reading(
    State(state): State<AppState>,
    Json(req): Json<SubmitReadingRequest>,
) -> Result<(StatusCode, Json<SensorEvent>), AppError> {
    let reading = req.validate()?;
    let event = state.store.append_reading(reading).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Fetch the latest reading for a device.
#[utoipa::path(
    get,
    path = "/api/sensors/latest",
    params(("device_id" = Option<String>, Query, description = "Sensing unit id")),
    responses(
        (status = 200, description = "Latest reading", body = SensorEvent),
        (status = 404, description = "No readings for this device yet"),
    ),
    tag = "sensors"
)]
pub async fn get_latest_reading(
    State(state): State<AppState>,
    Query(params): Query<DeviceParams>,
) -> Result<Json<SensorEvent>, AppError> {
    let reading = state
        .store
        .latest_reading(&params.device_id)
        .await
        .ok_or_else(|| {
            Error::NotFound(format!("no readings for device {}", params.device_id))
        })?;
    Ok(Json(reading))
}

/// Fetch readings in a time range, newest first. Bounds are inclusive and
/// optional: `?from=<RFC3339>&to=<RFC3339>&limit=<n>`.
#[utoipa::path(
    get,
    path = "/api/sensors",
    responses(
        (status = 200, description = "Readings, newest first", body = Vec<SensorEvent>),
    ),
    tag = "sensors"
)]
pub async fn get_readings(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Json<Vec<SensorEvent>> {
    let rows = state
        .store
        .readings_in_range(&params.device_id, params.from, params.to, params.limit)
        .await;
    Json(rows)
}

/// Per-channel statistics over the last `hours` (default 24).
#[utoipa::path(
    get,
    path = "/api/sensors/statistics",
    responses(
        (status = 200, description = "Windowed statistics", body = StatsResponse),
        (status = 400, description = "Window out of bounds"),
        (status = 404, description = "No readings in the window"),
    ),
    tag = "sensors"
)]
pub async fn get_statistics(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsResponse>, AppError> {
    let hours = params.validated_hours()?;
    let period_end = Utc::now();
    let period_start = period_end - Duration::hours(hours);

    let readings = state
        .store
        .readings_since(&params.device_id, period_start)
        .await;
    let report = stats::compute(&readings).ok_or_else(|| {
        Error::NotFound(format!(
            "no readings for device {} in the last {hours} hours",
            params.device_id
        ))
    })?;

    Ok(Json(StatsResponse {
        report,
        period_start,
        period_end,
    }))
}

/// Retention purge: delete readings older than `days` (default 30).
#[utoipa::path(
    delete,
    path = "/api/sensors/old",
    responses(
        (status = 200, description = "Number of readings deleted", body = PurgeResponse),
        (status = 400, description = "Non-positive or out-of-bounds days"),
    ),
    tag = "sensors"
)]
pub async fn purge_old_readings(
    State(state): State<AppState>,
    Query(params): Query<PurgeParams>,
) -> Result<Json<PurgeResponse>, AppError> {
    let days = params.validated_days()?;
    let cutoff = Utc::now() - Duration::days(days);
    let deleted_count = state.store.purge_readings_older_than(cutoff).await;
    Ok(Json(PurgeResponse { deleted_count }))
}

/// Delete every stored reading, across all devices.
#[utoipa::path(
    delete,
    path = "/api/sensors",
    responses(
        (status = 200, description = "Number of readings deleted", body = PurgeResponse),
    ),
    tag = "sensors"
)]
pub async fn delete_all_readings(State(state): State<AppState>) -> Json<PurgeResponse> {
    let deleted_count = state.store.delete_all_readings().await;
    Json(PurgeResponse { deleted_count })
}

// ---------------------------------------------------------------------------
// Actuator handlers
// ---------------------------------------------------------------------------

/// Apply an actuator command. `toggle` is resolved against the latest prior
/// transition for the same device before the event is committed.
#[utoipa::path(
    post,
    path = "/api/actuators",
    request_body = ActuatorCommandRequest,
    responses(
        (status = 201, description = "Transition persisted and broadcast", body = ActuatorEvent),
        (status = 400, description = "Unknown device type or action"),
        (status = 409, description = "Device busy — command lock timed out"),
    ),
    tag = "actuators"
)]
pub async fn post_actuator_command(
    State(state): State<AppState>,
    Json(req): Json<ActuatorCommandRequest>,
) -> Result<(StatusCode, Json<ActuatorEvent>), AppError> {
    let event = state.control.apply(req.into()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Current on/off state of every actuator. Devices with no history are off.
#[utoipa::path(
    get,
    path = "/api/actuators/states",
    responses(
        (status = 200, description = "Map of actuator kind to on/off state"),
    ),
    tag = "actuators"
)]
pub async fn get_actuator_states(
    State(state): State<AppState>,
    Query(params): Query<DeviceParams>,
) -> Json<BTreeMap<ActuatorKind, bool>> {
    Json(state.control.current_states(&params.device_id).await)
}

/// Transition history, newest first, optionally filtered by device type.
#[utoipa::path(
    get,
    path = "/api/actuators/history",
    responses(
        (status = 200, description = "Actuator transitions, newest first", body = Vec<ActuatorEvent>),
    ),
    tag = "actuators"
)]
pub async fn get_actuator_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<ActuatorEvent>> {
    let rows = state
        .store
        .actuator_history(params.device_type, &params.device_id, params.limit)
        .await;
    Json(rows)
}

/// Latest transition for a specific actuator.
#[utoipa::path(
    get,
    path = "/api/actuators/{device_type}/latest",
    params(("device_type" = ActuatorKind, Path, description = "Actuator kind")),
    responses(
        (status = 200, description = "Latest transition", body = ActuatorEvent),
        (status = 404, description = "No transitions for this actuator yet"),
    ),
    tag = "actuators"
)]
pub async fn get_actuator_latest(
    State(state): State<AppState>,
    Path(device_type): Path<ActuatorKind>,
    Query(params): Query<DeviceParams>,
) -> Result<Json<ActuatorEvent>, AppError> {
    let event = state
        .store
        .latest_actuator(device_type, &params.device_id)
        .await
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no transitions for {device_type} on device {}",
                params.device_id
            ))
        })?;
    Ok(Json(event))
}

// ---------------------------------------------------------------------------
// System handlers
// ---------------------------------------------------------------------------

/// Overall chamber status: liveness, counters, latest reading and actuator
/// states in one call.
#[utoipa::path(
    get,
    path = "/api/system/status",
    responses(
        (status = 200, description = "System status", body = SystemStatus),
    ),
    tag = "system"
)]
pub async fn get_system_status(
    State(state): State<AppState>,
    Query(params): Query<DeviceParams>,
) -> Json<SystemStatus> {
    let device_id = &params.device_id;
    let latest_reading = state.store.latest_reading(device_id).await;
    let uptime_ms = state
        .store
        .first_reading_at(device_id)
        .await
        .map(|first| (Utc::now() - first).num_milliseconds());

    let today_start = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now);

    Json(SystemStatus {
        online: latest_reading.is_some(),
        last_update: latest_reading.as_ref().map(|r| r.timestamp),
        uptime_ms,
        total_readings: state.store.count_readings(device_id).await,
        today_readings: state.store.count_readings_since(device_id, today_start).await,
        latest_reading,
        actuators: state.control.current_states(device_id).await,
    })
}

/// Everything a dashboard needs in one round trip: latest reading, last 24h
/// of history and actuator states.
#[utoipa::path(
    get,
    path = "/api/system/dashboard",
    responses(
        (status = 200, description = "Dashboard payload", body = Dashboard),
    ),
    tag = "system"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<DeviceParams>,
) -> Json<Dashboard> {
    let since = Utc::now() - Duration::hours(24);
    let mut history = state.store.readings_since(&params.device_id, since).await;
    history.truncate(100);

    Json(Dashboard {
        current: state.store.latest_reading(&params.device_id).await,
        history,
        actuators: state.control.current_states(&params.device_id).await,
        timestamp: Utc::now(),
    })
}

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        submit_reading,
        get_latest_reading,
        get_readings,
        get_statistics,
        purge_old_readings,
        delete_all_readings,
        post_actuator_command,
        get_actuator_states,
        get_actuator_history,
        get_actuator_latest,
        get_system_status,
        get_dashboard,
        health,
    ),
    components(schemas(
        SubmitReadingRequest,
        ActuatorCommandRequest,
        SensorEvent,
        ActuatorEvent,
        ActuatorKind,
        ActuatorAction,
        TriggeredBy,
        ChannelStats,
        StatsReport,
        StatsResponse,
        PurgeResponse,
        SystemStatus,
        Dashboard,
    )),
    tags(
        (name = "sensors", description = "Environmental reading endpoints"),
        (name = "actuators", description = "Actuator command and state endpoints"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Cultivation Chamber API",
        version = "0.1.0",
        description = "Event-sourced control backend for a cultivation chamber"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        api::{self, AppState},
        broadcast::Envelope,
    };

    fn test_state() -> AppState {
        AppState::new(16, std::time::Duration::from_secs(5))
    }

    fn test_server(state: AppState) -> TestServer {
        TestServer::new(api::router(state)).unwrap()
    }

    fn reading_body(temperature: f64) -> Value {
        json!({
            "temperature": temperature,
            "humidity": 60.0,
            "soil_moisture": 40.0,
            "co2_level": 800.0,
            "light_intensity": 1500.0
        })
    }

    // -----------------------------------------------------------------------
    // Sensors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn submit_reading_returns_created_event() {
        let server = test_server(test_state());
        let resp = server.post("/api/sensors").json(&reading_body(21.5)).await;
        resp.assert_status(StatusCode::CREATED);

        let body: Value = resp.json();
        assert_eq!(body["temperature"], 21.5);
        assert_eq!(body["device_id"], "esp32-main");
        assert!(body["id"].is_string());
    }

    #[tokio::test]
    async fn out_of_range_reading_is_rejected_and_not_persisted() {
        let server = test_server(test_state());

        let resp = server.post("/api/sensors").json(&reading_body(250.0)).await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        // Nothing reached the store.
        let latest = server.get("/api/sensors/latest").await;
        latest.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn latest_reading_404_then_200() {
        let server = test_server(test_state());

        let resp = server.get("/api/sensors/latest").await;
        resp.assert_status(StatusCode::NOT_FOUND);

        server.post("/api/sensors").json(&reading_body(19.0)).await;
        let resp = server.get("/api/sensors/latest").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["temperature"], 19.0);
    }

    #[tokio::test]
    async fn readings_come_back_newest_first_with_limit() {
        let server = test_server(test_state());
        for t in [18.0, 19.0, 20.0] {
            server.post("/api/sensors").json(&reading_body(t)).await;
        }

        let resp = server.get("/api/sensors").add_query_param("limit", 2).await;
        resp.assert_status_ok();
        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0]["temperature"], 20.0);
        assert_eq!(body[1]["temperature"], 19.0);
    }

    #[tokio::test]
    async fn statistics_404_on_empty_window() {
        let server = test_server(test_state());
        let resp = server.get("/api/sensors/statistics").await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn statistics_report_lower_median() {
        let server = test_server(test_state());
        for t in [4.0, 1.0, 3.0, 2.0] {
            server.post("/api/sensors").json(&reading_body(t)).await;
        }

        let resp = server.get("/api/sensors/statistics").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["temperature"]["min"], 1.0);
        assert_eq!(body["temperature"]["max"], 4.0);
        assert_eq!(body["temperature"]["average"], 2.5);
        // sorted [1,2,3,4], lower median at index 2.
        assert_eq!(body["temperature"]["median"], 3.0);
        assert_eq!(body["temperature"]["latest"], 2.0);
        assert_eq!(body["total_readings"], 4);
    }

    #[tokio::test]
    async fn statistics_reject_out_of_bounds_hours_without_panicking() {
        let server = test_server(test_state());
        server.post("/api/sensors").json(&reading_body(20.0)).await;

        // Large enough to overflow chrono's duration math if unchecked.
        let resp = server
            .get("/api/sensors/statistics")
            .add_query_param("hours", 4_000_000_000_000_i64)
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let resp = server
            .get("/api/sensors/statistics")
            .add_query_param("hours", 0)
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        // The service is still healthy and the bounded window still works.
        let resp = server.get("/api/sensors/statistics").await;
        resp.assert_status_ok();
    }

    #[tokio::test]
    async fn purge_rejects_negative_days_and_keeps_fresh_readings() {
        let server = test_server(test_state());
        server.post("/api/sensors").json(&reading_body(21.0)).await;

        // A future cutoff must never be accepted — it would delete
        // everything, fresh readings included.
        let resp = server
            .delete("/api/sensors/old")
            .add_query_param("days", -100_000)
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let resp = server
            .delete("/api/sensors/old")
            .add_query_param("days", 0)
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);

        let latest = server.get("/api/sensors/latest").await;
        latest.assert_status_ok();
    }

    #[tokio::test]
    async fn delete_all_removes_readings_across_devices() {
        let server = test_server(test_state());
        server.post("/api/sensors").json(&reading_body(20.0)).await;
        server
            .post("/api/sensors")
            .json(&json!({
                "temperature": 22.0,
                "humidity": 50.0,
                "soil_moisture": 30.0,
                "device_id": "esp32-aux"
            }))
            .await;

        let resp = server.delete("/api/sensors").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["deleted_count"], 2);

        let latest = server.get("/api/sensors/latest").await;
        latest.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn purge_endpoint_is_idempotent() {
        let server = test_server(test_state());
        let old = (Utc::now() - Duration::days(40)).to_rfc3339();
        server
            .post("/api/sensors")
            .json(&json!({
                "temperature": 20.0,
                "humidity": 60.0,
                "soil_moisture": 40.0,
                "timestamp": old
            }))
            .await;
        server.post("/api/sensors").json(&reading_body(21.0)).await;

        let resp = server.delete("/api/sensors/old").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["deleted_count"], 1);

        let resp = server.delete("/api/sensors/old").await;
        let body: Value = resp.json();
        assert_eq!(body["deleted_count"], 0);
    }

    // -----------------------------------------------------------------------
    // Actuators
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn first_toggle_turns_actuator_on() {
        let server = test_server(test_state());
        let resp = server
            .post("/api/actuators")
            .json(&json!({ "device_type": "mist_maker", "action": "toggle" }))
            .await;
        resp.assert_status(StatusCode::CREATED);

        let body: Value = resp.json();
        assert_eq!(body["state"], true);
        assert_eq!(body["requested_action"], "toggle");
        assert_eq!(body["triggered_by"], "app");
    }

    #[tokio::test]
    async fn unknown_device_type_is_rejected() {
        let server = test_server(test_state());
        let resp = server
            .post("/api/actuators")
            .json(&json!({ "device_type": "disco_ball", "action": "on" }))
            .await;
        assert!(resp.status_code().is_client_error());
    }

    #[tokio::test]
    async fn states_default_to_all_off() {
        let server = test_server(test_state());
        let resp = server.get("/api/actuators/states").await;
        resp.assert_status_ok();

        let body: Value = resp.json();
        let states = body.as_object().unwrap();
        assert_eq!(states.len(), ActuatorKind::ALL.len());
        assert!(states.values().all(|v| v.as_bool() == Some(false)));
    }

    #[tokio::test]
    async fn on_then_toggle_ends_off() {
        let server = test_server(test_state());
        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "exhaust_fan_1", "action": "on" }))
            .await;
        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "exhaust_fan_1", "action": "toggle" }))
            .await;

        let resp = server.get("/api/actuators/states").await;
        let body: Value = resp.json();
        assert_eq!(body["exhaust_fan_1"], false);
    }

    #[tokio::test]
    async fn history_filters_by_device_type() {
        let server = test_server(test_state());
        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "water_pump", "action": "on" }))
            .await;
        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "grow_light", "action": "on" }))
            .await;

        let resp = server
            .get("/api/actuators/history")
            .add_query_param("device_type", "water_pump")
            .await;
        resp.assert_status_ok();
        let body: Vec<Value> = resp.json();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0]["device_type"], "water_pump");
    }

    #[tokio::test]
    async fn actuator_latest_404_then_200() {
        let server = test_server(test_state());

        let resp = server.get("/api/actuators/grow_light/latest").await;
        resp.assert_status(StatusCode::NOT_FOUND);

        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "grow_light", "action": "on" }))
            .await;
        let resp = server.get("/api/actuators/grow_light/latest").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["state"], true);
    }

    // -----------------------------------------------------------------------
    // End-to-end fanout ordering
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn subscriber_sees_ack_then_transitions_in_order() {
        let state = test_state();
        let mut sub = state.broadcaster.subscribe().await;
        let server = test_server(state);

        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "exhaust_fan_1", "action": "on" }))
            .await;
        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "exhaust_fan_1", "action": "toggle" }))
            .await;

        assert!(matches!(
            sub.events.recv().await.unwrap(),
            Envelope::Connection { .. }
        ));
        match sub.events.recv().await.unwrap() {
            Envelope::ActuatorStatus { data, .. } => assert!(data.state),
            other => panic!("expected actuator_status, got {other:?}"),
        }
        match sub.events.recv().await.unwrap() {
            Envelope::ActuatorStatus { data, .. } => assert!(!data.state),
            other => panic!("expected actuator_status, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // System
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn system_status_reflects_readings_and_actuators() {
        let server = test_server(test_state());

        let resp = server.get("/api/system/status").await;
        let body: Value = resp.json();
        assert_eq!(body["online"], false);
        assert_eq!(body["total_readings"], 0);

        server.post("/api/sensors").json(&reading_body(22.0)).await;
        server
            .post("/api/actuators")
            .json(&json!({ "device_type": "mist_maker", "action": "on" }))
            .await;

        let resp = server.get("/api/system/status").await;
        let body: Value = resp.json();
        assert_eq!(body["online"], true);
        assert_eq!(body["total_readings"], 1);
        assert_eq!(body["today_readings"], 1);
        assert_eq!(body["actuators"]["mist_maker"], true);
        assert_eq!(body["latest_reading"]["temperature"], 22.0);
    }

    #[tokio::test]
    async fn dashboard_bundles_current_history_and_states() {
        let server = test_server(test_state());
        for t in [20.0, 21.0] {
            server.post("/api/sensors").json(&reading_body(t)).await;
        }

        let resp = server.get("/api/system/dashboard").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["current"]["temperature"], 21.0);
        assert_eq!(body["history"].as_array().unwrap().len(), 2);
        assert_eq!(body["actuators"]["grow_light"], false);
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let server = test_server(test_state());
        let resp = server.get("/health").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn openapi_spec_is_served() {
        let server = test_server(test_state());
        let resp = server.get("/api-docs/openapi.json").await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["info"]["title"], "Cultivation Chamber API");
    }
}
