use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::{
    control::ActuatorCommand,
    error::{Error, Result},
    stats::StatsReport,
    store::models::{
        ActuatorAction, ActuatorKind, NewReading, SensorEvent, TriggeredBy,
    },
};

pub const DEFAULT_DEVICE_ID: &str = "esp32-main";

fn default_device_id() -> String {
    DEFAULT_DEVICE_ID.to_owned()
}

// ---------------------------------------------------------------------------
// Valid channel ranges — enforced here, at the boundary. Out-of-range values
// never reach the store.
// ---------------------------------------------------------------------------

const TEMPERATURE_RANGE: (f64, f64) = (-50.0, 100.0);
const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
const SOIL_MOISTURE_RANGE: (f64, f64) = (0.0, 100.0);
const CO2_RANGE: (f64, f64) = (0.0, 10_000.0);
const LIGHT_RANGE: (f64, f64) = (0.0, 100_000.0);

fn check_range(channel: &str, value: f64, (lo, hi): (f64, f64)) -> Result<()> {
    if !value.is_finite() || value < lo || value > hi {
        return Err(Error::Validation(format!(
            "{channel} must be between {lo} and {hi}, got {value}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Inbound sensor reading, accepted over HTTP POST and as a websocket text
/// frame. `co2`/`light` aliases match what older sensing firmware sends.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitReadingRequest {
    pub temperature: f64,
    pub humidity: f64,
    pub soil_moisture: f64,
    #[serde(default, alias = "co2")]
    pub co2_level: Option<f64>,
    #[serde(default, alias = "light")]
    pub light_intensity: Option<f64>,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SubmitReadingRequest {
    /// Range-check every channel and hand a `NewReading` to the store.
    pub fn validate(self) -> Result<NewReading> {
        check_range("temperature", self.temperature, TEMPERATURE_RANGE)?;
        check_range("humidity", self.humidity, HUMIDITY_RANGE)?;
        check_range("soil_moisture", self.soil_moisture, SOIL_MOISTURE_RANGE)?;
        if let Some(co2) = self.co2_level {
            check_range("co2_level", co2, CO2_RANGE)?;
        }
        if let Some(light) = self.light_intensity {
            check_range("light_intensity", light, LIGHT_RANGE)?;
        }

        Ok(NewReading {
            device_id: self.device_id,
            temperature: self.temperature,
            humidity: self.humidity,
            soil_moisture: self.soil_moisture,
            co2_level: self.co2_level,
            light_intensity: self.light_intensity,
            timestamp: self.timestamp,
        })
    }
}

/// Inbound actuator command. Unknown device types or actions are rejected
/// at deserialization.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ActuatorCommandRequest {
    pub device_type: ActuatorKind,
    pub action: ActuatorAction,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_triggered_by")]
    pub triggered_by: TriggeredBy,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

fn default_triggered_by() -> TriggeredBy {
    TriggeredBy::App
}

impl From<ActuatorCommandRequest> for ActuatorCommand {
    fn from(req: ActuatorCommandRequest) -> Self {
        ActuatorCommand {
            device_type: req.device_type,
            device_id: req.device_id,
            action: req.action,
            triggered_by: req.triggered_by,
            duration_secs: req.duration_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DeviceParams {
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "default_reading_limit")]
    pub limit: usize,
}

fn default_reading_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_stats_hours")]
    pub hours: i64,
}

fn default_stats_hours() -> i64 {
    24
}

/// Widest stats window a client may request (one year). Also keeps the
/// value far away from `chrono::Duration::hours`'s panic range.
pub const MAX_STATS_HOURS: i64 = 24 * 365;

impl StatsParams {
    pub fn validated_hours(&self) -> Result<i64> {
        if !(1..=MAX_STATS_HOURS).contains(&self.hours) {
            return Err(Error::Validation(format!(
                "hours must be between 1 and {MAX_STATS_HOURS}, got {}",
                self.hours
            )));
        }
        Ok(self.hours)
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    pub device_type: Option<ActuatorKind>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct PurgeParams {
    #[serde(default = "default_purge_days")]
    pub days: i64,
}

fn default_purge_days() -> i64 {
    30
}

/// Oldest retention cutoff a client may request (100 years).
pub const MAX_PURGE_DAYS: i64 = 36_500;

impl PurgeParams {
    /// Retention must never purge forward in time: non-positive `days`
    /// would place the cutoff in the future and delete fresh readings.
    pub fn validated_days(&self) -> Result<i64> {
        if !(1..=MAX_PURGE_DAYS).contains(&self.days) {
            return Err(Error::Validation(format!(
                "days must be between 1 and {MAX_PURGE_DAYS}, got {}",
                self.days
            )));
        }
        Ok(self.days)
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub report: StatsReport,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurgeResponse {
    pub deleted_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemStatus {
    pub online: bool,
    pub last_update: Option<DateTime<Utc>>,
    /// Milliseconds since the first stored reading for this device.
    pub uptime_ms: Option<i64>,
    pub total_readings: usize,
    pub today_readings: usize,
    pub latest_reading: Option<SensorEvent>,
    pub actuators: BTreeMap<ActuatorKind, bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub current: Option<SensorEvent>,
    pub history: Vec<SensorEvent>,
    pub actuators: BTreeMap<ActuatorKind, bool>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(temperature: f64) -> SubmitReadingRequest {
        SubmitReadingRequest {
            temperature,
            humidity: 60.0,
            soil_moisture: 40.0,
            co2_level: None,
            light_intensity: None,
            device_id: DEFAULT_DEVICE_ID.to_owned(),
            timestamp: None,
        }
    }

    #[test]
    fn in_range_reading_passes() {
        assert!(request(21.5).validate().is_ok());
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let err = request(150.0).validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn nan_is_rejected() {
        assert!(request(f64::NAN).validate().is_err());
    }

    #[test]
    fn out_of_range_optional_channel_is_rejected() {
        let mut req = request(21.5);
        req.co2_level = Some(20_000.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn firmware_aliases_deserialize() {
        let json = r#"{
            "temperature": 22.0,
            "humidity": 55.0,
            "soil_moisture": 48.0,
            "co2": 760.0,
            "light": 1200.0
        }"#;
        let req: SubmitReadingRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.co2_level, Some(760.0));
        assert_eq!(req.light_intensity, Some(1200.0));
        assert_eq!(req.device_id, DEFAULT_DEVICE_ID);
    }

    #[test]
    fn stats_hours_must_be_within_bounds() {
        let params = |hours| StatsParams {
            device_id: DEFAULT_DEVICE_ID.to_owned(),
            hours,
        };
        assert!(params(24).validated_hours().is_ok());
        assert!(params(MAX_STATS_HOURS).validated_hours().is_ok());
        assert!(params(0).validated_hours().is_err());
        assert!(params(-5).validated_hours().is_err());
        // Values this large would panic inside chrono if they got through.
        assert!(params(4_000_000_000_000).validated_hours().is_err());
    }

    #[test]
    fn purge_days_must_be_positive_and_bounded() {
        let params = |days| PurgeParams { days };
        assert!(params(30).validated_days().is_ok());
        assert!(params(1).validated_days().is_ok());
        assert!(params(0).validated_days().is_err());
        // A negative cutoff would sit in the future and delete everything.
        assert!(params(-100_000).validated_days().is_err());
        assert!(params(MAX_PURGE_DAYS + 1).validated_days().is_err());
    }

    #[test]
    fn unknown_action_fails_deserialization() {
        let json = r#"{"device_type": "mist_maker", "action": "pulse"}"#;
        assert!(serde_json::from_str::<ActuatorCommandRequest>(json).is_err());
    }
}
