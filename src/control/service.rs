use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use tokio::{sync::Mutex, time::timeout};
use tracing::info;

use crate::{
    error::{Error, Result},
    store::{
        models::{ActuatorAction, ActuatorEvent, ActuatorKind, NewActuatorEvent, TriggeredBy},
        EventStore,
    },
};

/// A validated actuator request, as handed over by the boundary layer.
#[derive(Debug, Clone)]
pub struct ActuatorCommand {
    pub device_type: ActuatorKind,
    pub device_id: String,
    pub action: ActuatorAction,
    pub triggered_by: TriggeredBy,
    pub duration_secs: Option<u64>,
}

/// Resolves actuator commands against the event log and commits the
/// resulting transition.
///
/// `toggle` needs the latest prior state, so resolve-then-append must be a
/// single logical step per device: a per-`(kind, device_id)` mutex
/// serializes commands for the same device while leaving different devices
/// fully parallel. Acquisition is bounded — a contested device surfaces a
/// `Conflict` instead of starving the caller.
#[derive(Clone)]
pub struct ControlService {
    store: EventStore,
    locks: Arc<Mutex<HashMap<(ActuatorKind, String), Arc<Mutex<()>>>>>,
    lock_timeout: Duration,
}

impl ControlService {
    pub fn new(store: EventStore, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Resolve `command` to a concrete on/off state and append the
    /// transition. Returns the persisted event.
    pub async fn apply(&self, command: ActuatorCommand) -> Result<ActuatorEvent> {
        if command.device_id.trim().is_empty() {
            return Err(Error::Validation("device_id must not be empty".to_owned()));
        }

        let key = (command.device_type, command.device_id.clone());
        let device_lock = self.lock_for(&key).await;

        let event = {
            let _guard = timeout(self.lock_timeout, device_lock.lock())
                .await
                .map_err(|_| {
                    Error::Conflict(format!(
                        "actuator {}/{} is busy",
                        command.device_type, command.device_id
                    ))
                })?;

            let state = match command.action {
                ActuatorAction::On => true,
                ActuatorAction::Off => false,
                ActuatorAction::Toggle => self
                    .store
                    .latest_actuator(command.device_type, &command.device_id)
                    .await
                    .map(|prior| !prior.state)
                    // No history yet: a toggle turns the device on.
                    .unwrap_or(true),
            };

            self.store
                .append_actuator(NewActuatorEvent {
                    device_type: command.device_type,
                    device_id: command.device_id,
                    requested_action: command.action,
                    state,
                    triggered_by: command.triggered_by,
                    duration_secs: command.duration_secs,
                    timestamp: None,
                })
                .await?
        };

        self.release_if_idle(&key, device_lock).await;

        info!(
            device_type = %event.device_type,
            device_id = %event.device_id,
            action = %event.requested_action,
            state = event.state,
            "Actuator command applied"
        );
        Ok(event)
    }

    /// Current on/off state of every known actuator for `device_id`.
    ///
    /// Best-effort snapshot: each device is read independently, which is
    /// fine because devices are independent. No history means `false`.
    pub async fn current_states(&self, device_id: &str) -> BTreeMap<ActuatorKind, bool> {
        let mut states = BTreeMap::new();
        for kind in ActuatorKind::ALL {
            let state = self
                .store
                .latest_actuator(kind, device_id)
                .await
                .map(|e| e.state)
                .unwrap_or(false);
            states.insert(kind, state);
        }
        states
    }

    async fn lock_for(&self, key: &(ActuatorKind, String)) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the map entry once no other task holds or awaits the device
    /// lock, so the map does not grow without bound with client-supplied
    /// device ids.
    async fn release_if_idle(&self, key: &(ActuatorKind, String), device_lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Two strong owners left means the map entry plus our local clone.
        // New waiters need the map lock we are holding to obtain a clone,
        // so the count cannot rise under us.
        if Arc::strong_count(&device_lock) == 2 {
            locks.remove(key);
        }
    }
}
