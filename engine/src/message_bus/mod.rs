//! Event Bus for session observers
//!
//! The orchestrator and the session store announce state changes here so a
//! front end can redraw without polling. Subscriptions are per event type or
//! global ("All"), each backed by a bounded channel.
//!
//! Publishing never waits on a slow observer: an event that does not fit in a
//! subscriber's buffer is dropped for that subscriber, and subscribers whose
//! receiver has gone away are pruned.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be published on the bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    /// A turn passed validation and is in flight
    TurnStarted,
    /// A turn produced a reply
    TurnResolved,
    /// A turn failed after it started
    TurnFailed,
    /// Remote memories may have changed
    MemoriesChanged,
    /// Session settings were persisted
    ConfigSaved,
    /// Subscribe to all event types
    All,
}

/// Events that can be published on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TurnStarted { turn_id: String },
    TurnResolved { turn_id: String },
    TurnFailed { turn_id: String, error: String },
    MemoriesChanged,
    ConfigSaved,
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::TurnStarted { .. } => EventType::TurnStarted,
            Event::TurnResolved { .. } => EventType::TurnResolved,
            Event::TurnFailed { .. } => EventType::TurnFailed,
            Event::MemoriesChanged => EventType::MemoriesChanged,
            Event::ConfigSaved => EventType::ConfigSaved,
        }
    }
}

/// Pub/sub bus between the engine and its observers
pub struct EventBus {
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to its type's subscribers and to "All" subscribers
    pub async fn publish(&self, event: Event) {
        let mut channels = self.channels.lock().await;
        let event_type = event.event_type();

        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        debug!("Subscriber buffer full, dropping {:?}", event_type);
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
