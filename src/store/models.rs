use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Actuator enums
// ---------------------------------------------------------------------------

/// The closed set of controllable devices in the chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    #[serde(rename = "exhaust_fan_1")]
    ExhaustFan1,
    #[serde(rename = "exhaust_fan_2")]
    ExhaustFan2,
    MistMaker,
    WaterPump,
    GrowLight,
    PeltierUnit,
}

impl ActuatorKind {
    /// Every known actuator, in a stable order. Used for state snapshots.
    pub const ALL: [ActuatorKind; 6] = [
        ActuatorKind::ExhaustFan1,
        ActuatorKind::ExhaustFan2,
        ActuatorKind::MistMaker,
        ActuatorKind::WaterPump,
        ActuatorKind::GrowLight,
        ActuatorKind::PeltierUnit,
    ];
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActuatorKind::ExhaustFan1 => "exhaust_fan_1",
            ActuatorKind::ExhaustFan2 => "exhaust_fan_2",
            ActuatorKind::MistMaker => "mist_maker",
            ActuatorKind::WaterPump => "water_pump",
            ActuatorKind::GrowLight => "grow_light",
            ActuatorKind::PeltierUnit => "peltier_unit",
        };
        f.write_str(s)
    }
}

/// What the caller asked for. The requested action is preserved on the
/// event as provenance; the control service resolves it to the concrete
/// `state` field before the event is appended, so a persisted `Toggle`
/// always sits next to a resolved on/off state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorAction {
    On,
    Off,
    Toggle,
}

impl fmt::Display for ActuatorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActuatorAction::On => "on",
            ActuatorAction::Off => "off",
            ActuatorAction::Toggle => "toggle",
        };
        f.write_str(s)
    }
}

/// Provenance of an actuator command. Informational only — state resolution
/// never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    Manual,
    Automation,
    Schedule,
    App,
}

// ---------------------------------------------------------------------------
// Stored events
// ---------------------------------------------------------------------------

/// One environmental reading from the sensing unit. Immutable once appended.
///
/// CO2 and light are optional: older sensing units do not carry those
/// channels, and statistics are computed per channel from whatever samples
/// exist.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SensorEvent {
    pub id: Uuid,
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub co2_level: Option<f64>,
    pub light_intensity: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// One actuator transition. Immutable once appended.
///
/// `state` is always concrete: `toggle` requests are resolved against the
/// latest prior event for the same `(device_type, device_id)` before the
/// event is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActuatorEvent {
    pub id: Uuid,
    pub device_type: ActuatorKind,
    pub device_id: String,
    pub requested_action: ActuatorAction,
    pub state: bool,
    pub triggered_by: TriggeredBy,
    /// Planned active duration in seconds. Advisory only — the core runs no
    /// timer for it.
    pub duration_secs: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Ingestion inputs
// ---------------------------------------------------------------------------

/// A validated reading handed to the store for persistence. `timestamp`
/// defaults to the append instant when absent.
#[derive(Debug, Clone)]
pub struct NewReading {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    pub co2_level: Option<f64>,
    pub light_intensity: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A fully resolved actuator transition ready for persistence.
#[derive(Debug, Clone)]
pub struct NewActuatorEvent {
    pub device_type: ActuatorKind,
    pub device_id: String,
    pub requested_action: ActuatorAction,
    pub state: bool,
    pub triggered_by: TriggeredBy,
    pub duration_secs: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
}
