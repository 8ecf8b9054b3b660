// MIT License - Copyright (c) 2026 The dsc2smartthings authors

//! SmartThings integration: forwards zone/partition change events to the
//! automation service.
//!
//! Delivery is best-effort. An authorization failure triggers exactly one
//! token refresh and one retry; any further failure drops the event with a
//! log line. There is no queue and no persistence.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::OauthCredential;
use crate::error::{BridgeError, Result};
use crate::event::{EventReceiver, PartitionChangeEvent, SessionEvent, ZoneChangeEvent};
use crate::repository::ConfigRepository;

/// Endpoints and limits for the integration.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    /// Base URL events are posted under (`{base}/zone`, `{base}/partition`).
    pub endpoint_url: String,
    /// OAuth token endpoint used for refresh.
    pub token_url: String,
    /// Bound on every outbound request.
    pub request_timeout: std::time::Duration,
}

/// Forwards session events to the automation service using the stored
/// OAuth credential, refreshing it when it expires.
pub struct IntegrationBridge {
    http: reqwest::Client,
    config: IntegrationConfig,
    tokens: Arc<ConfigRepository<OauthCredential>>,
    /// Serializes refreshes: racing deliveries wait here and then re-check
    /// expiry, so N concurrent 401s cause one refresh, not N.
    refresh_gate: Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

impl IntegrationBridge {
    pub fn new(
        config: IntegrationConfig,
        tokens: Arc<ConfigRepository<OauthCredential>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            tokens,
            refresh_gate: Mutex::new(()),
        })
    }

    /// Consume session events until the channel closes.
    pub async fn run(self: Arc<Self>, mut rx: EventReceiver) {
        info!("Integration bridge listening for session events");
        loop {
            match rx.recv().await {
                Ok(SessionEvent::ZoneChange(event)) => self.forward_zone_change(&event).await,
                Ok(SessionEvent::PartitionChange(event)) => {
                    self.forward_partition_change(&event).await
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Integration bridge lagged, missed {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    info!("Session event channel closed, integration bridge stopping");
                    break;
                }
            }
        }
    }

    /// Best-effort delivery of a zone transition.
    pub async fn forward_zone_change(&self, event: &ZoneChangeEvent) {
        if let Err(e) = self.deliver("zone", event).await {
            warn!("Dropping zone {} change event: {e}", event.zone);
        }
    }

    /// Best-effort delivery of a partition transition.
    pub async fn forward_partition_change(&self, event: &PartitionChangeEvent) {
        if let Err(e) = self.deliver("partition", event).await {
            warn!("Dropping partition {} change event: {e}", event.partition);
        }
    }

    async fn deliver(&self, kind: &str, payload: &impl Serialize) -> Result<()> {
        let token = self.access_token().await?;
        let status = self.post(kind, payload, &token).await?;

        if status == StatusCode::UNAUTHORIZED {
            debug!("Integration returned 401, refreshing token and retrying once");
            let token = self.refresh().await?;
            let status = self.post(kind, payload, &token).await?;
            if !status.is_success() {
                return Err(BridgeError::IntegrationRejected {
                    status: status.as_u16(),
                });
            }
            return Ok(());
        }

        if !status.is_success() {
            return Err(BridgeError::IntegrationRejected {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn post(&self, kind: &str, payload: &impl Serialize, token: &str) -> Result<StatusCode> {
        let url = format!("{}/{kind}", self.config.endpoint_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;
        Ok(response.status())
    }

    /// Current access token, refreshed first if it is expired. The
    /// credential is never used past its expiry.
    async fn access_token(&self) -> Result<String> {
        let credential = self.tokens.get().await?;
        if credential.is_expired(Utc::now()) {
            return self.refresh().await;
        }
        Ok(credential.access_token)
    }

    /// Exchange the refresh token for a fresh credential and persist it.
    async fn refresh(&self) -> Result<String> {
        let _guard = self.refresh_gate.lock().await;

        // Another delivery may have finished the refresh while we waited.
        let current = self.tokens.get().await?;
        if !current.is_expired(Utc::now()) {
            return Ok(current.access_token);
        }

        info!("Refreshing integration access token");
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", current.refresh_token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BridgeError::TokenRefresh {
                details: format!("token endpoint returned HTTP {}", response.status()),
            });
        }

        let token: TokenResponse = response.json().await?;
        let credential = OauthCredential::new(
            token.access_token,
            token.refresh_token.unwrap_or(current.refresh_token),
            Utc::now() + ChronoDuration::seconds(token.expires_in),
        );
        self.tokens.save(&credential).await?;
        Ok(credential.access_token)
    }
}
