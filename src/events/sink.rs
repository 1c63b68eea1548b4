use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::trace;

use super::Event;

/// Receiver of raised and cleared events.
pub trait AlertSink: Send {
    fn emit(&self, event: &Event);
}

/// Fans events out to every subscriber of a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Event>,
}

impl BroadcastSink {
    pub fn new(sender: broadcast::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl AlertSink for BroadcastSink {
    fn emit(&self, event: &Event) {
        if self.sender.send(event.clone()).is_err() {
            trace!(event_id = event.id, "no event subscribers");
        }
    }
}

/// Keeps every emitted event in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for CollectingSink {
    fn emit(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
