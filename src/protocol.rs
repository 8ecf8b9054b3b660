// MIT License - Copyright (c) 2026 The dsc2smartthings authors

//! Envisalink TPI wire protocol.
//!
//! Every frame is an ASCII line `CCC<data><checksum>\r\n` where `CCC` is a
//! 3-digit command code and the checksum is the low byte of the sum of the
//! ASCII values of code + data, rendered as two uppercase hex digits.
//!
//! # Session flow
//!
//! ```text
//! TCP connect
//!   <- 505 3        (login interaction: password request)
//!   -> 005 <pwd>
//!   <- 500 005      (command ack)
//!   <- 505 1        (login success)
//!   -> 001          (status report request)
//!   <- 500 001
//!   <- 609/610/650/652/655 ...   (state dump, then live updates)
//! ```
//!
//! Commands are acknowledged with `500<code>` or refused with `502<err>`.
//! A frame the panel could not verify is answered with `501`.

use crate::config::ArmMode;
use crate::error::{BridgeError, Result};

/// Compute the TPI checksum for a code+data payload.
pub fn checksum(payload: &str) -> String {
    let sum: u32 = payload.bytes().map(u32::from).sum();
    format!("{:02X}", sum & 0xFF)
}

/// Encode a code+data pair into a full frame including terminator.
pub fn encode_frame(code: &str, data: &str) -> String {
    format!("{code}{data}{}\r\n", checksum(&format!("{code}{data}")))
}

/// Split a received line (terminator already stripped) into code and data,
/// verifying the trailing checksum.
pub fn decode_frame(line: &str) -> Result<(&str, &str)> {
    if line.len() < 5 || !line.is_ascii() {
        return Err(BridgeError::MalformedFrame {
            details: format!("frame too short or non-ASCII: {line:?}"),
        });
    }
    let (payload, received) = line.split_at(line.len() - 2);
    if checksum(payload) != received {
        return Err(BridgeError::MalformedFrame {
            details: format!("checksum mismatch on {payload:?}"),
        });
    }
    let (code, data) = payload.split_at(3);
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BridgeError::MalformedFrame {
            details: format!("non-numeric command code: {code:?}"),
        });
    }
    Ok((code, data))
}

/// Commands that can be sent to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `000` — Keep-alive poll. The panel answers with a plain ack.
    Poll,
    /// `001` — Request a full status report. The panel replies with an ack
    /// followed by a burst of zone/partition status messages.
    StatusReport,
    /// `005<password>` — Network login, answered by a 505 interaction.
    NetworkLogin { password: String },
    /// `030<partition>` — Arm a partition in away mode.
    ArmAway { partition: u8 },
    /// `031<partition>` — Arm a partition in stay mode.
    ArmStay { partition: u8 },
    /// `040<partition><code>` — Disarm a partition with a user code.
    Disarm { partition: u8, code: String },
}

impl Command {
    pub fn code(&self) -> &'static str {
        match self {
            Command::Poll => "000",
            Command::StatusReport => "001",
            Command::NetworkLogin { .. } => "005",
            Command::ArmAway { .. } => "030",
            Command::ArmStay { .. } => "031",
            Command::Disarm { .. } => "040",
        }
    }

    pub fn data(&self) -> String {
        match self {
            Command::Poll | Command::StatusReport => String::new(),
            Command::NetworkLogin { password } => password.clone(),
            Command::ArmAway { partition } | Command::ArmStay { partition } => {
                partition.to_string()
            }
            Command::Disarm { partition, code } => format!("{partition}{code}"),
        }
    }

    /// Full wire frame for this command.
    pub fn encode(&self) -> String {
        encode_frame(self.code(), &self.data())
    }

    /// Create an arm command from an ArmMode.
    pub fn arm(partition: u8, mode: ArmMode) -> Self {
        match mode {
            ArmMode::Away => Command::ArmAway { partition },
            ArmMode::Stay => Command::ArmStay { partition },
        }
    }
}

/// Result of a `505` login interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// `0` — password rejected
    Failed,
    /// `1` — login successful
    Success,
    /// `2` — panel timed out waiting for the password
    Timeout,
    /// `3` — panel requests the password
    PasswordRequest,
}

/// Messages received from the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelMessage {
    /// `500` — Command acknowledged; data echoes the acked command code.
    CommandAck { echoed: String },
    /// `501` — The panel could not verify our frame's checksum.
    ChecksumRejected,
    /// `502` — System error; data is a 3-digit error code.
    SystemError { code: String },
    /// `505` — Login interaction.
    LoginInteraction(LoginStatus),
    /// `609` — Zone open.
    ZoneOpen { zone: u32 },
    /// `610` — Zone restored (closed).
    ZoneRestored { zone: u32 },
    /// `605` — Zone fault.
    ZoneFault { zone: u32 },
    /// `606` — Zone fault restored.
    ZoneFaultRestored { zone: u32 },
    /// `650` — Partition ready to arm.
    PartitionReady { partition: u8 },
    /// `651` — Partition not ready.
    PartitionNotReady { partition: u8 },
    /// `652` — Partition armed; data carries the arm mode.
    PartitionArmed { partition: u8, mode: ArmMode },
    /// `654` — Partition in alarm.
    PartitionInAlarm { partition: u8 },
    /// `655` — Partition disarmed.
    PartitionDisarmed { partition: u8 },
    /// Any code this library does not interpret.
    Unknown { code: String, data: String },
}

impl PanelMessage {
    /// Whether this message terminates an in-flight command.
    pub fn is_command_reply(&self) -> bool {
        matches!(
            self,
            PanelMessage::CommandAck { .. }
                | PanelMessage::ChecksumRejected
                | PanelMessage::SystemError { .. }
        )
    }
}

/// Parse a received line into a panel message, verifying the checksum.
pub fn parse_message(line: &str) -> Result<PanelMessage> {
    let (code, data) = decode_frame(line)?;
    let msg = match code {
        "500" => PanelMessage::CommandAck {
            echoed: data.to_string(),
        },
        "501" => PanelMessage::ChecksumRejected,
        "502" => PanelMessage::SystemError {
            code: data.to_string(),
        },
        "505" => PanelMessage::LoginInteraction(match data {
            "0" => LoginStatus::Failed,
            "1" => LoginStatus::Success,
            "2" => LoginStatus::Timeout,
            "3" => LoginStatus::PasswordRequest,
            other => {
                return Err(BridgeError::MalformedFrame {
                    details: format!("unknown login interaction: {other:?}"),
                })
            }
        }),
        "605" => PanelMessage::ZoneFault { zone: parse_zone(data)? },
        "606" => PanelMessage::ZoneFaultRestored { zone: parse_zone(data)? },
        "609" => PanelMessage::ZoneOpen { zone: parse_zone(data)? },
        "610" => PanelMessage::ZoneRestored { zone: parse_zone(data)? },
        "650" => PanelMessage::PartitionReady { partition: parse_partition(data)? },
        "651" => PanelMessage::PartitionNotReady { partition: parse_partition(data)? },
        "652" => {
            let partition = parse_partition(&data[..1.min(data.len())])?;
            let mode = match data.get(1..2) {
                Some("1") => ArmMode::Stay,
                _ => ArmMode::Away,
            };
            PanelMessage::PartitionArmed { partition, mode }
        }
        "654" => PanelMessage::PartitionInAlarm { partition: parse_partition(data)? },
        "655" => PanelMessage::PartitionDisarmed { partition: parse_partition(data)? },
        other => PanelMessage::Unknown {
            code: other.to_string(),
            data: data.to_string(),
        },
    };
    Ok(msg)
}

/// Zone numbers are zero-padded 3-digit decimals (e.g. `005`).
fn parse_zone(data: &str) -> Result<u32> {
    data.parse().map_err(|_| BridgeError::MalformedFrame {
        details: format!("bad zone number: {data:?}"),
    })
}

/// Partition numbers are single decimal digits.
fn parse_partition(data: &str) -> Result<u8> {
    data.parse().map_err(|_| BridgeError::MalformedFrame {
        details: format!("bad partition number: {data:?}"),
    })
}

/// Human-readable description of a `502` system error code.
pub fn describe_system_error(code: &str) -> &'static str {
    match code {
        "001" => "Receive buffer overrun",
        "002" => "Receive buffer overflow",
        "017" => "Keybus busy",
        "020" => "Invalid command length",
        "021" => "Requested partition is out of range",
        "022" => "Command not supported",
        "023" => "Partition not armed",
        "024" => "Partition not ready to arm",
        "026" => "User code required",
        _ => "Unknown error",
    }
}
