// MIT License - Copyright (c) 2026 The dsc2smartthings authors

/// All errors that can occur in the envisalink-bridge library.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection failed: {details}")]
    Connection { details: String },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Not connected to panel")]
    NotConnected,

    #[error("A command is already in flight")]
    Busy,

    #[error("Command timeout: {command}")]
    CommandTimeout { command: String },

    #[error("Command rejected by panel: error {code} ({})", crate::protocol::describe_system_error(.code))]
    CommandRejected { code: String },

    #[error("Panel rejected frame checksum")]
    ChecksumRejected,

    #[error("Panel login rejected")]
    LoginRejected,

    #[error("Login timed out waiting for panel")]
    LoginTimeout,

    #[error("Malformed frame: {details}")]
    MalformedFrame { details: String },

    #[error("Unexpected panel reply: {details}")]
    UnexpectedReply { details: String },

    #[error("Persistence error for {path}: {source}")]
    Persistence {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {path}: {source}")]
    MalformedConfig {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Account not found: {username}")]
    AccountNotFound { username: String },

    #[error("Invalid credential for {username}")]
    InvalidCredential { username: String },

    #[error("Integration request failed: {0}")]
    Integration(#[from] reqwest::Error),

    #[error("Integration rejected event: HTTP {status}")]
    IntegrationRejected { status: u16 },

    #[error("Token refresh failed: {details}")]
    TokenRefresh { details: String },
}

impl BridgeError {
    /// Whether this error is transient and the connection should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Io(_)
                | BridgeError::Connection { .. }
                | BridgeError::ConnectionTimeout
                | BridgeError::CommandTimeout { .. }
                | BridgeError::LoginTimeout
                | BridgeError::NotConnected
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
