//! Event bus contract and the custom events the add-on registers.
//!
//! Phase transitions are published as `phase_changed` events carrying a
//! `PhaseChangeEvent` payload. The host supplies the real bus; an
//! in-process broadcast implementation is provided for embedding and tests.

use crate::phase::PhaseChangeEvent;

/// Custom event names registered with the host application.
pub const TRANSFER_STARTED: &str = "transfer_started";
pub const TRANSFER_COMPLETE: &str = "transfer_complete";
pub const TRANSFER_ERROR: &str = "transfer_error";
pub const PHASE_CHANGED: &str = "phase_changed";

/// All custom events, in registration order.
pub const REGISTRATION: &[&str] = &[
    TRANSFER_STARTED,
    TRANSFER_COMPLETE,
    TRANSFER_ERROR,
    PHASE_CHANGED,
];

/// Event bus supplied by the host application.
/// Real implementation: the host's event system. In-process
/// implementation: `BroadcastBus`.
pub trait EventBus: Send + Sync {
    fn fire(&self, event: &str, payload: &PhaseChangeEvent);
}

/// A fired event as seen by in-process subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub name: String,
    pub payload: PhaseChangeEvent,
}

/// In-process event bus over a tokio broadcast sender.
pub struct BroadcastBus {
    tx: tokio::sync::broadcast::Sender<BusEvent>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl EventBus for BroadcastBus {
    fn fire(&self, event: &str, payload: &PhaseChangeEvent) {
        // Events are best-effort; a bus with no subscribers drops them.
        let _ = self.tx.send(BusEvent {
            name: event.to_string(),
            payload: payload.clone(),
        });
    }
}
