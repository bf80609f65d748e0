use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::models::{ActuatorEvent, SensorEvent};

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// Message delivered to realtime subscribers. `connection` is sent exactly
/// once, before any live data, so clients can tell "connected, no data yet"
/// from "not connected".
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Connection {
        message: String,
        timestamp: DateTime<Utc>,
    },
    SensorUpdate {
        data: SensorEvent,
        timestamp: DateTime<Utc>,
    },
    ActuatorStatus {
        data: ActuatorEvent,
        timestamp: DateTime<Utc>,
    },
}

impl Envelope {
    fn connection() -> Self {
        Envelope::Connection {
            message: "Connected to chamber event stream".to_owned(),
            timestamp: Utc::now(),
        }
    }

    pub fn sensor_update(event: SensorEvent) -> Self {
        Envelope::SensorUpdate {
            data: event,
            timestamp: Utc::now(),
        }
    }

    pub fn actuator_status(event: ActuatorEvent) -> Self {
        Envelope::ActuatorStatus {
            data: event,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// A live subscriber's receiving end. Dropping it closes the channel; the
/// next publish notices and removes the registry entry.
pub struct Subscription {
    pub id: Uuid,
    pub events: mpsc::Receiver<Envelope>,
}

/// Fans every published envelope out to all current subscribers.
///
/// Each subscriber gets a private bounded channel. Delivery uses `try_send`
/// only, so a publish never blocks: a subscriber whose buffer is full (too
/// slow) or whose channel is closed (gone) is disconnected, and the rest are
/// unaffected.
///
/// Cheaply cloneable; clones share the subscriber registry.
#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Envelope>>>>,
    capacity: usize,
}

impl Broadcaster {
    /// `capacity` is the per-subscriber outbound buffer; values below 1 are
    /// clamped so the connection ack always fits.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber. The `connection` ack is enqueued before
    /// the entry becomes visible to `publish`, so it precedes all live data.
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();

        let mut subs = self.subscribers.write().await;
        // Fresh channel with capacity >= 1: this cannot fail.
        let _ = tx.try_send(Envelope::connection());
        subs.insert(id, tx);
        debug!(subscriber = %id, total = subs.len(), "Subscriber connected");

        Subscription { id, events: rx }
    }

    /// Remove a subscriber. Idempotent — unknown or already-removed ids are
    /// a no-op.
    pub async fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.write().await.remove(&id).is_some() {
            debug!(subscriber = %id, "Subscriber removed");
        }
    }

    /// Deliver `envelope` to every subscriber. Never fails and never blocks;
    /// subscriber-side problems only ever cost that subscriber its slot.
    pub async fn publish(&self, envelope: Envelope) {
        let dead: Vec<Uuid> = {
            let subs = self.subscribers.read().await;
            subs.iter()
                .filter_map(|(id, tx)| match tx.try_send(envelope.clone()) {
                    Ok(()) => None,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(subscriber = %id, "Subscriber buffer full, disconnecting");
                        Some(*id)
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(subscriber = %id, "Subscriber channel closed, removing");
                        Some(*id)
                    }
                })
                .collect()
        };

        if !dead.is_empty() {
            let mut subs = self.subscribers.write().await;
            for id in dead {
                subs.remove(&id);
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
