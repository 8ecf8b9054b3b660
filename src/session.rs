// MIT License - Copyright (c) 2026 The dsc2smartthings authors

use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{AlarmSystemConfig, ArmMode};
use crate::error::{BridgeError, Result};
use crate::event::{event_channel, EventReceiver, EventSender, SessionEvent};
use crate::protocol::{Command, PanelMessage};
use crate::state::AlarmState;
use crate::transport::PanelLink;

/// Connection lifecycle of an [`AlarmSession`].
///
/// ```text
/// Disconnected -> Connecting -> Running -> Reconnecting -> Running
///                                              |
///                                              v (attempts exhausted)
///                                            Failed
/// ```
///
/// `Failed` is terminal until an explicit [`AlarmSession::start`] retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Running,
    Reconnecting,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Running => "running",
            SessionStatus::Reconnecting => "reconnecting",
            SessionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between the session and its link's read loop.
///
/// The read loop is the only writer of `state`.
pub(crate) struct SessionCore {
    pub(crate) state: RwLock<AlarmState>,
    pub(crate) event_tx: EventSender,
}

type LinkSlot = Arc<Mutex<Option<Arc<PanelLink>>>>;

/// The main public API for talking to the alarm panel.
///
/// Owns one long-lived panel connection, keeps the live zone/partition
/// snapshot, and broadcasts change events. Request handlers receive a
/// shared handle (`Arc<AlarmSession>`) through dependency injection; there
/// is no ambient singleton.
pub struct AlarmSession {
    config: AlarmSystemConfig,
    core: Arc<SessionCore>,
    status_tx: watch::Sender<SessionStatus>,
    link: LinkSlot,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AlarmSession {
    pub fn new(config: AlarmSystemConfig) -> Self {
        let (event_tx, _event_rx) = event_channel(256);
        let (status_tx, _) = watch::channel(SessionStatus::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            core: Arc::new(SessionCore {
                state: RwLock::new(AlarmState::default()),
                event_tx,
            }),
            status_tx,
            link: Arc::new(Mutex::new(None)),
            shutdown_tx,
            supervisor: Mutex::new(None),
        }
    }

    /// Open the panel connection and transition to RUNNING.
    ///
    /// Fails with a connection error when the panel is unreachable; the
    /// session stays DISCONNECTED and may be started again. Once RUNNING, a
    /// supervisor task handles keep-alive polling and reconnection; only
    /// exhausted reconnect attempts move the session to the terminal FAILED
    /// state, from which `start` is again the only way out.
    pub async fn start(&self) -> Result<()> {
        match self.status() {
            SessionStatus::Running | SessionStatus::Connecting | SessionStatus::Reconnecting => {
                return Ok(())
            }
            SessionStatus::Disconnected | SessionStatus::Failed => {}
        }

        let _ = self.status_tx.send(SessionStatus::Connecting);
        let link = match PanelLink::open(&self.config, self.core.clone()).await {
            Ok(link) => link,
            Err(e) => {
                let _ = self.status_tx.send(SessionStatus::Disconnected);
                return Err(e);
            }
        };

        *self.link.lock().await = Some(Arc::new(link));
        let _ = self.status_tx.send(SessionStatus::Running);
        let _ = self.core.event_tx.send(SessionEvent::Connected);

        let mut supervisor = self.supervisor.lock().await;
        if let Some(old) = supervisor.take() {
            old.abort();
        }
        *supervisor = Some(tokio::spawn(run_supervisor(
            self.config.clone(),
            self.core.clone(),
            self.status_tx.clone(),
            self.link.clone(),
            self.shutdown_tx.subscribe(),
        )));

        Ok(())
    }

    /// Current lifecycle status.
    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Watch channel for status transitions, e.g. to let the owning process
    /// react to FAILED.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Immutable snapshot of the current zone/partition state. Never
    /// touches the network.
    pub async fn current_state(&self) -> AlarmState {
        self.core.state.read().await.clone()
    }

    /// Subscribe to session events. Each subscriber gets its own bounded
    /// queue; lagging only loses that subscriber's oldest events.
    pub fn subscribe(&self) -> EventReceiver {
        self.core.event_tx.subscribe()
    }

    /// Arm a partition. Authorization is the caller's responsibility.
    pub async fn arm_partition(&self, partition: u8, mode: ArmMode) -> Result<()> {
        debug!("Arming partition {partition} ({mode:?})");
        self.issue(Command::arm(partition, mode)).await
    }

    /// Disarm a partition using the configured user code.
    pub async fn disarm_partition(&self, partition: u8) -> Result<()> {
        debug!("Disarming partition {partition}");
        self.issue(Command::Disarm {
            partition,
            code: self.config.user_code.clone(),
        })
        .await
    }

    async fn issue(&self, command: Command) -> Result<()> {
        if self.status() != SessionStatus::Running {
            return Err(BridgeError::NotConnected);
        }
        let link = self
            .link
            .lock()
            .await
            .clone()
            .ok_or(BridgeError::NotConnected)?;

        match link.send_command(&command).await? {
            PanelMessage::CommandAck { .. } => Ok(()),
            PanelMessage::SystemError { code } => Err(BridgeError::CommandRejected { code }),
            PanelMessage::ChecksumRejected => Err(BridgeError::ChecksumRejected),
            other => Err(BridgeError::UnexpectedReply {
                details: format!("{other:?}"),
            }),
        }
    }

    /// Stop the supervisor, drop the connection, and return to DISCONNECTED.
    pub async fn shutdown(&self) {
        info!("Shutting down alarm session");
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.supervisor.lock().await.take() {
            handle.abort();
        }
        *self.link.lock().await = None;
        let _ = self.status_tx.send(SessionStatus::Disconnected);
    }
}

impl Drop for AlarmSession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut supervisor) = self.supervisor.try_lock() {
            if let Some(handle) = supervisor.take() {
                handle.abort();
            }
        }
    }
}

/// Supervisor: keep-alive polling while RUNNING, bounded-backoff
/// reconnection after a drop, FAILED once attempts are exhausted.
async fn run_supervisor(
    config: AlarmSystemConfig,
    core: Arc<SessionCore>,
    status_tx: watch::Sender<SessionStatus>,
    link_slot: LinkSlot,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut poll = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // An interval's first tick fires immediately; the link was just opened,
    // so consume it.
    poll.tick().await;

    loop {
        let mut closed = match link_slot.lock().await.as_ref() {
            Some(link) => link.closed(),
            None => return,
        };

        // Running phase.
        loop {
            tokio::select! {
                _ = closed.changed() => break,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = poll.tick() => {
                    let link = link_slot.lock().await.clone();
                    let Some(link) = link else { return };
                    match link.send_command(&Command::Poll).await {
                        Ok(_) => {}
                        // A user command in flight proves liveness.
                        Err(BridgeError::Busy) => {}
                        Err(e) => {
                            warn!("Keep-alive poll failed: {e}");
                            break;
                        }
                    }
                }
            }
        }

        // Reconnect phase.
        warn!("Panel connection lost, reconnecting");
        let _ = status_tx.send(SessionStatus::Reconnecting);
        *link_slot.lock().await = None;

        let mut attempt: u32 = 0;
        let new_link = loop {
            if attempt >= config.max_reconnect_attempts {
                break None;
            }
            let delay = config.backoff_delay(attempt);
            debug!("Reconnect attempt {} in {:?}", attempt + 1, delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
            }
            attempt += 1;

            let opened = tokio::select! {
                res = PanelLink::open(&config, core.clone()) => res,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        // Cancelling the open drops the half-connected
                        // socket with it.
                        return;
                    }
                    continue;
                }
            };
            match opened {
                Ok(link) => break Some(link),
                Err(e) if e.is_retryable() => {
                    warn!("Reconnect attempt {attempt} failed: {e}");
                }
                Err(e) => {
                    error!("Reconnect failed with non-retryable error: {e}");
                    break None;
                }
            }
        };

        match new_link {
            Some(link) => {
                *link_slot.lock().await = Some(Arc::new(link));
                let _ = status_tx.send(SessionStatus::Running);
                let _ = core.event_tx.send(SessionEvent::Connected);
                info!("Panel reconnected");
            }
            None => {
                error!(
                    "Giving up after {} reconnect attempts; session failed",
                    config.max_reconnect_attempts
                );
                let _ = status_tx.send(SessionStatus::Failed);
                return;
            }
        }
    }
}
