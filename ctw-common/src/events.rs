//! Dashboard events and the broadcast event bus
//!
//! The refresh scheduler emits an event after every refresh attempt; the SSE
//! endpoint forwards them so open dashboards reload without blanking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Events emitted by the refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardEvent {
    /// A refresh finished and a new snapshot is being served
    SnapshotUpdated {
        generated_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        rows: usize,
    },

    /// A refresh failed; the previous snapshot (if any) is still served
    RefreshFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DashboardEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            DashboardEvent::SnapshotUpdated { .. } => "SnapshotUpdated",
            DashboardEvent::RefreshFailed { .. } => "RefreshFailed",
        }
    }
}

/// Broadcast bus for [`DashboardEvent`]s
///
/// Cloning the bus shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new bus buffering up to `capacity` events per slow subscriber
    ///
    /// # Examples
    ///
    /// ```
    /// use ctw_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(16);
    /// assert_eq!(event_bus.capacity(), 16);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DashboardEvent) {
        let event_type = event.event_type();
        if self.tx.send(event).is_err() {
            debug!("No subscribers for {} event", event_type);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
