// MIT License - Copyright (c) 2026 The dsc2smartthings authors

use serde::{Deserialize, Serialize};

/// Status of a single monitored zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    /// The sensor is at rest.
    #[default]
    Closed,
    /// The sensor is tripped (door/window open, motion detected).
    Open,
    /// The sensor reports a wiring or supervision fault.
    Fault,
}

impl ZoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Closed => "closed",
            ZoneStatus::Open => "open",
            ZoneStatus::Fault => "fault",
        }
    }
}

impl std::fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
