// MIT License - Copyright (c) 2026 The dsc2smartthings authors

//! Live panel state: zone and partition status snapshots.
//!
//! [`AlarmState`] is owned exclusively by the session's read loop; everyone
//! else sees cloned snapshots. Folding a panel message through
//! [`AlarmState::apply`] yields at most one change event, and only when the
//! stored value actually changed — replaying the same message twice can
//! never produce a duplicate transition.

pub mod partition;
pub mod zone;

pub use partition::PartitionStatus;
pub use zone::ZoneStatus;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::{PartitionChangeEvent, ZoneChangeEvent};
use crate::protocol::PanelMessage;

/// Snapshot of everything the bridge knows about the panel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlarmState {
    pub zones: BTreeMap<u32, ZoneStatus>,
    pub partitions: BTreeMap<u8, PartitionStatus>,
}

/// A single observed transition, produced by [`AlarmState::apply`].
#[derive(Debug, Clone)]
pub enum StateChange {
    Zone(ZoneChangeEvent),
    Partition(PartitionChangeEvent),
}

impl AlarmState {
    /// Fold one panel message into the state.
    ///
    /// Returns the transition it caused, or `None` when the message does not
    /// carry zone/partition status or restates the current value.
    pub fn apply(&mut self, msg: &PanelMessage, at: DateTime<Utc>) -> Option<StateChange> {
        match msg {
            PanelMessage::ZoneOpen { zone } => self.set_zone(*zone, ZoneStatus::Open, at),
            PanelMessage::ZoneRestored { zone } | PanelMessage::ZoneFaultRestored { zone } => {
                self.set_zone(*zone, ZoneStatus::Closed, at)
            }
            PanelMessage::ZoneFault { zone } => self.set_zone(*zone, ZoneStatus::Fault, at),
            PanelMessage::PartitionArmed { partition, .. } => {
                self.set_partition(*partition, PartitionStatus::Armed, at)
            }
            PanelMessage::PartitionDisarmed { partition } => {
                self.set_partition(*partition, PartitionStatus::Disarmed, at)
            }
            PanelMessage::PartitionInAlarm { partition } => {
                self.set_partition(*partition, PartitionStatus::Alarm, at)
            }
            _ => None,
        }
    }

    fn set_zone(&mut self, zone: u32, status: ZoneStatus, at: DateTime<Utc>) -> Option<StateChange> {
        let previous = self.zones.get(&zone).copied().unwrap_or_default();
        if previous == status {
            return None;
        }
        self.zones.insert(zone, status);
        Some(StateChange::Zone(ZoneChangeEvent {
            zone,
            previous,
            current: status,
            at,
        }))
    }

    fn set_partition(
        &mut self,
        partition: u8,
        status: PartitionStatus,
        at: DateTime<Utc>,
    ) -> Option<StateChange> {
        let previous = self.partitions.get(&partition).copied().unwrap_or_default();
        if previous == status {
            return None;
        }
        self.partitions.insert(partition, status);
        Some(StateChange::Partition(PartitionChangeEvent {
            partition,
            previous,
            current: status,
            at,
        }))
    }

    pub fn zone(&self, zone: u32) -> ZoneStatus {
        self.zones.get(&zone).copied().unwrap_or_default()
    }

    pub fn partition(&self, partition: u8) -> PartitionStatus {
        self.partitions.get(&partition).copied().unwrap_or_default()
    }
}
