// MIT License - Copyright (c) 2026 The dsc2smartthings authors

use serde::{Deserialize, Serialize};

/// Status of a partition (a group of zones armed and disarmed together).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStatus {
    #[default]
    Disarmed,
    Armed,
    /// An armed zone tripped and the siren condition is active.
    Alarm,
}

impl PartitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionStatus::Disarmed => "disarmed",
            PartitionStatus::Armed => "armed",
            PartitionStatus::Alarm => "alarm",
        }
    }
}

impl std::fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disarmed() {
        assert_eq!(PartitionStatus::default(), PartitionStatus::Disarmed);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&PartitionStatus::Alarm).unwrap(),
            "\"alarm\""
        );
    }
}
