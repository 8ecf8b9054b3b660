// MIT License - Copyright (c) 2026 The dsc2smartthings authors

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Arm mode for partition arming commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmMode {
    /// Full/away arm
    Away,
    /// Partial/stay/home arm
    Stay,
}

/// Connection parameters for the alarm panel, persisted as
/// `AlarmSystemInfo.json`.
///
/// The on-disk document is the sole source of truth: the session reads it
/// once at startup and the only way to change it is an explicit repository
/// write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSystemConfig {
    /// Panel (Envisalink module) host name or IP address
    pub host: String,
    /// Panel TCP port (default: 4025)
    pub port: u16,
    /// Network login password
    pub password: String,
    /// User code used for disarm commands
    pub user_code: String,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-command reply timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Keep-alive poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Base delay for exponential reconnect backoff, in milliseconds
    pub reconnect_delay_ms: u64,
    /// Maximum reconnect attempts before the session reports FAILED
    pub max_reconnect_attempts: u32,
}

impl Default for AlarmSystemConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 4025,
            password: "user".to_string(),
            user_code: "1234".to_string(),
            connect_timeout_ms: 5000,
            command_timeout_ms: 5000,
            poll_interval_ms: 30_000,
            reconnect_delay_ms: 10_000,
            max_reconnect_attempts: 5,
        }
    }
}

impl AlarmSystemConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> AlarmSystemConfigBuilder {
        AlarmSystemConfigBuilder::default()
    }

    /// Backoff delay before reconnect attempt `attempt` (0-based).
    ///
    /// Doubles per attempt with the shift capped, so the delay never grows
    /// past 16x the base.
    pub fn backoff_delay(&self, attempt: u32) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_delay_ms * (1 << attempt.min(4)))
    }
}

/// Builder for AlarmSystemConfig.
#[derive(Debug, Clone, Default)]
pub struct AlarmSystemConfigBuilder {
    config: AlarmSystemConfig,
}

impl AlarmSystemConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn user_code(mut self, code: impl Into<String>) -> Self {
        self.config.user_code = code.into();
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.command_timeout_ms = ms;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn build(self) -> AlarmSystemConfig {
        self.config
    }
}

/// OAuth token pair for the SmartThings integration, persisted as
/// `SmartThings.json`.
///
/// Only the bridge's refresh routine writes this; everyone else reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OauthCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Default for OauthCredential {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            refresh_token: String::new(),
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Leeway subtracted from the expiry so a token is never presented right at
/// the edge of its lifetime.
const EXPIRY_LEEWAY_SECS: i64 = 30;

impl OauthCredential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Whether the access token should be considered unusable at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_LEEWAY_SECS) <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AlarmSystemConfig::default();
        assert_eq!(config.port, 4025);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.poll_interval_ms, 30_000);
    }

    #[test]
    fn test_config_builder() {
        let config = AlarmSystemConfig::builder()
            .host("10.0.0.8")
            .port(4026)
            .password("secret")
            .user_code("9999")
            .max_reconnect_attempts(2)
            .build();

        assert_eq!(config.host, "10.0.0.8");
        assert_eq!(config.port, 4026);
        assert_eq!(config.password, "secret");
        assert_eq!(config.user_code, "9999");
        assert_eq!(config.max_reconnect_attempts, 2);
    }

    #[test]
    fn test_backoff_delay_caps() {
        let config = AlarmSystemConfig::builder().reconnect_delay_ms(100).build();
        assert_eq!(config.backoff_delay(0).as_millis(), 100);
        assert_eq!(config.backoff_delay(1).as_millis(), 200);
        assert_eq!(config.backoff_delay(4).as_millis(), 1600);
        // Shift is capped: attempt 10 gets the same delay as attempt 4.
        assert_eq!(config.backoff_delay(10).as_millis(), 1600);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = AlarmSystemConfig::builder().host("panel.local").build();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AlarmSystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let parsed: AlarmSystemConfig =
            serde_json::from_str(r#"{"host": "panel.local"}"#).unwrap();
        assert_eq!(parsed.host, "panel.local");
        assert_eq!(parsed.port, 4025);
    }

    #[test]
    fn test_default_credential_is_expired() {
        assert!(OauthCredential::default().is_expired(Utc::now()));
    }

    #[test]
    fn test_credential_expiry_leeway() {
        let now = Utc::now();
        let cred = OauthCredential::new("at", "rt", now + Duration::seconds(10));
        // Inside the 30s leeway window counts as expired.
        assert!(cred.is_expired(now));

        let cred = OauthCredential::new("at", "rt", now + Duration::seconds(3600));
        assert!(!cred.is_expired(now));
    }
}
