pub mod models;

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    broadcast::{Broadcaster, Envelope},
    error::{Error, Result},
};
use models::{ActuatorEvent, ActuatorKind, NewActuatorEvent, NewReading, SensorEvent};

/// Append-only log of sensor readings and actuator transitions.
///
/// Events are never mutated or reordered after commit; corrections are new
/// events. Arrival may be out of timestamp order, so every read path orders
/// by timestamp rather than trusting insertion order. A latest-transition
/// index per `(ActuatorKind, device_id)` keeps current-state lookups O(1).
///
/// Every successful append publishes its envelope to the broadcaster before
/// returning, while still holding the write guard — publishes therefore
/// reach subscribers in commit order.
///
/// Cheaply cloneable; clones share the same log.
#[derive(Clone)]
pub struct EventStore {
    inner: Arc<RwLock<Inner>>,
    broadcaster: Broadcaster,
}

#[derive(Default)]
struct Inner {
    readings: Vec<SensorEvent>,
    actuator_log: Vec<ActuatorEvent>,
    latest_actuator: HashMap<(ActuatorKind, String), ActuatorEvent>,
}

impl EventStore {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            broadcaster,
        }
    }

    // -----------------------------------------------------------------------
    // Appends
    // -----------------------------------------------------------------------

    /// Persist a sensor reading and notify subscribers.
    pub async fn append_reading(&self, reading: NewReading) -> Result<SensorEvent> {
        if reading.device_id.trim().is_empty() {
            return Err(Error::Validation("device_id must not be empty".to_owned()));
        }

        let event = SensorEvent {
            id: Uuid::new_v4(),
            device_id: reading.device_id,
            temperature: reading.temperature,
            humidity: reading.humidity,
            soil_moisture: reading.soil_moisture,
            co2_level: reading.co2_level,
            light_intensity: reading.light_intensity,
            timestamp: reading.timestamp.unwrap_or_else(Utc::now),
        };

        let mut inner = self.inner.write().await;
        inner.readings.push(event.clone());
        self.broadcaster
            .publish(Envelope::sensor_update(event.clone()))
            .await;
        drop(inner);

        debug!(device_id = %event.device_id, id = %event.id, "Sensor reading appended");
        Ok(event)
    }

    /// Persist a resolved actuator transition and notify subscribers.
    ///
    /// The caller (the control service) is responsible for holding the
    /// per-device lock across resolve-then-append; the store itself only
    /// guarantees commit atomicity and index consistency.
    pub async fn append_actuator(&self, transition: NewActuatorEvent) -> Result<ActuatorEvent> {
        if transition.device_id.trim().is_empty() {
            return Err(Error::Validation("device_id must not be empty".to_owned()));
        }

        let event = ActuatorEvent {
            id: Uuid::new_v4(),
            device_type: transition.device_type,
            device_id: transition.device_id,
            requested_action: transition.requested_action,
            state: transition.state,
            triggered_by: transition.triggered_by,
            duration_secs: transition.duration_secs,
            timestamp: transition.timestamp.unwrap_or_else(Utc::now),
        };

        let mut inner = self.inner.write().await;
        inner.actuator_log.push(event.clone());

        // Keep the index pointing at the chronologically latest transition,
        // tolerating out-of-order arrival. Ties go to the newer append.
        let key = (event.device_type, event.device_id.clone());
        match inner.latest_actuator.get(&key) {
            Some(current) if current.timestamp > event.timestamp => {}
            _ => {
                inner.latest_actuator.insert(key, event.clone());
            }
        }

        self.broadcaster
            .publish(Envelope::actuator_status(event.clone()))
            .await;
        drop(inner);

        debug!(
            device_type = %event.device_type,
            device_id = %event.device_id,
            state = event.state,
            "Actuator transition appended"
        );
        Ok(event)
    }

    // -----------------------------------------------------------------------
    // Sensor queries
    // -----------------------------------------------------------------------

    /// The chronologically latest reading for a device, if any.
    pub async fn latest_reading(&self, device_id: &str) -> Option<SensorEvent> {
        let inner = self.inner.read().await;
        inner
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .max_by_key(|r| r.timestamp)
            .cloned()
    }

    /// Readings for a device within `[from, to]` (both inclusive, both
    /// optional), newest first, capped at `limit`.
    pub async fn readings_in_range(
        &self,
        device_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<SensorEvent> {
        let inner = self.inner.read().await;
        let mut rows: Vec<SensorEvent> = inner
            .readings
            .iter()
            .filter(|r| {
                r.device_id == device_id
                    && from.is_none_or(|f| r.timestamp >= f)
                    && to.is_none_or(|t| r.timestamp <= t)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        rows
    }

    /// All readings for a device at or after `since`, newest first.
    pub async fn readings_since(
        &self,
        device_id: &str,
        since: DateTime<Utc>,
    ) -> Vec<SensorEvent> {
        self.readings_in_range(device_id, Some(since), None, usize::MAX)
            .await
    }

    pub async fn first_reading_at(&self, device_id: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().await;
        inner
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .map(|r| r.timestamp)
            .min()
    }

    pub async fn count_readings(&self, device_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .count()
    }

    pub async fn count_readings_since(&self, device_id: &str, since: DateTime<Utc>) -> usize {
        let inner = self.inner.read().await;
        inner
            .readings
            .iter()
            .filter(|r| r.device_id == device_id && r.timestamp >= since)
            .count()
    }

    // -----------------------------------------------------------------------
    // Actuator queries
    // -----------------------------------------------------------------------

    /// The chronologically latest transition for `(kind, device_id)`.
    pub async fn latest_actuator(
        &self,
        kind: ActuatorKind,
        device_id: &str,
    ) -> Option<ActuatorEvent> {
        let inner = self.inner.read().await;
        inner
            .latest_actuator
            .get(&(kind, device_id.to_owned()))
            .cloned()
    }

    /// Transition history, optionally filtered by actuator kind, newest
    /// first, capped at `limit`.
    pub async fn actuator_history(
        &self,
        kind: Option<ActuatorKind>,
        device_id: &str,
        limit: usize,
    ) -> Vec<ActuatorEvent> {
        let inner = self.inner.read().await;
        let mut rows: Vec<ActuatorEvent> = inner
            .actuator_log
            .iter()
            .filter(|e| e.device_id == device_id && kind.is_none_or(|k| e.device_type == k))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        rows
    }

    // -----------------------------------------------------------------------
    // Retention
    // -----------------------------------------------------------------------

    /// Delete readings strictly older than `cutoff`, returning how many were
    /// removed. Idempotent: a second identical call removes nothing.
    pub async fn purge_readings_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.readings.len();
        inner.readings.retain(|r| r.timestamp >= cutoff);
        before - inner.readings.len()
    }

    /// Delete every stored reading across all devices, returning how many
    /// were removed. The actuator log is untouched — it is the source of
    /// device state, not retained telemetry.
    pub async fn delete_all_readings(&self) -> usize {
        let mut inner = self.inner.write().await;
        let removed = inner.readings.len();
        inner.readings.clear();
        removed
    }
}
