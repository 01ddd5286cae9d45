//! Event buffering: events sent before any user or guest identity is known
//! are persisted in order and replayed once an identity resolves.

use std::sync::Arc;

use parking_lot::Mutex;
use pushapp_core::SdkResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, KEY_EVENT_BUFFER};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub event_name: String,
    pub event_data: Value,
}

/// Append-only buffer persisted under a single store key.
pub struct EventBuffer {
    store: Arc<dyn KeyValueStore>,
    // Serialises read-modify-write of the stored list.
    guard: Mutex<()>,
}

impl EventBuffer {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    fn load(&self) -> Vec<PendingEvent> {
        let Some(raw) = self.store.get(KEY_EVENT_BUFFER) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable event buffer");
            Vec::new()
        })
    }

    pub fn push(&self, event_name: &str, event_data: Value) -> SdkResult<()> {
        let _lock = self.guard.lock();
        let mut events = self.load();
        events.push(PendingEvent {
            event_name: event_name.to_string(),
            event_data,
        });
        self.store
            .set(KEY_EVENT_BUFFER, serde_json::to_string(&events)?)?;
        metrics::counter!("pushapp.events.buffered").increment(1);
        debug!(event = %event_name, buffered = events.len(), "Buffered event");
        Ok(())
    }

    /// Remove and return all buffered events in insertion order.
    pub fn drain(&self) -> Vec<PendingEvent> {
        let _lock = self.guard.lock();
        let events = self.load();
        if let Err(e) = self.store.remove(KEY_EVENT_BUFFER) {
            warn!(error = %e, "Failed to clear event buffer");
        }
        events
    }

    pub fn len(&self) -> usize {
        let _lock = self.guard.lock();
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
