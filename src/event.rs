// MIT License - Copyright (c) 2026 The dsc2smartthings authors

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::{PartitionStatus, StateChange, ZoneStatus};

/// A single zone transition observed from the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneChangeEvent {
    pub zone: u32,
    pub previous: ZoneStatus,
    pub current: ZoneStatus,
    pub at: DateTime<Utc>,
}

/// A single partition transition observed from the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionChangeEvent {
    pub partition: u8,
    pub previous: PartitionStatus,
    pub current: PartitionStatus,
    pub at: DateTime<Utc>,
}

/// All events emitted by an alarm session.
///
/// Subscribers receive these through a `tokio::sync::broadcast` channel:
/// each subscriber has its own bounded queue, so a slow consumer lags and
/// drops its own oldest events rather than stalling the panel read loop.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The panel connection is established and authenticated.
    Connected,
    /// The panel connection was lost; the session will try to reconnect.
    Disconnected,
    ZoneChange(ZoneChangeEvent),
    PartitionChange(PartitionChangeEvent),
}

impl From<StateChange> for SessionEvent {
    fn from(change: StateChange) -> Self {
        match change {
            StateChange::Zone(ev) => SessionEvent::ZoneChange(ev),
            StateChange::Partition(ev) => SessionEvent::PartitionChange(ev),
        }
    }
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<SessionEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<SessionEvent>;

/// Create a new event channel with the given per-subscriber capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
