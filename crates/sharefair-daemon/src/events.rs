//! In-process event bus.
//!
//! Every committed ledger mutation is published here after it has been
//! persisted. Subscribers get an independent buffer; a slow subscriber
//! lags and loses the oldest events rather than blocking the ledger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Kinds of events the daemon emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    DaemonStarted,
    SharesTransferred,
    AllowanceSet,
    RevenueReceived,
    PremiumSet,
    DividendsHarvested,
    ValueDeposited,
    ValueWithdrawn,
}

/// An event emitted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type.
    pub kind: EventKind,
    /// Position in the emission order, starting at 1.
    pub sequence: u64,
    /// Ledger time-index the event happened at.
    pub time_index: u64,
    /// Type-specific payload.
    pub payload: serde_json::Value,
}

/// Event bus for broadcasting events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers. Returns its sequence number.
    pub fn emit(&self, kind: EventKind, time_index: u64, payload: serde_json::Value) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(Event {
            kind,
            sequence,
            time_index,
            payload,
        });
        sequence
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
