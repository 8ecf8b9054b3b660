// MIT License - Copyright (c) 2026 The dsc2smartthings authors

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::config::AlarmSystemConfig;
use crate::error::{BridgeError, Result};
use crate::event::SessionEvent;
use crate::protocol::{Command, LoginStatus, PanelMessage};
use crate::session::SessionCore;
use crate::transport::command::CommandGate;

/// One authenticated TCP connection to the panel.
///
/// The read half lives on a dedicated task that parses frames, routes
/// command replies to the [`CommandGate`], and folds status messages into
/// the shared [`AlarmState`](crate::state::AlarmState). The link reports
/// its death through a watch channel so the session supervisor can start
/// reconnecting.
pub struct PanelLink {
    gate: Arc<CommandGate>,
    writer: Mutex<OwnedWriteHalf>,
    command_timeout: Duration,
    closed_rx: watch::Receiver<bool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl PanelLink {
    /// Connect, authenticate, and request the initial status report.
    ///
    /// Sequence: TCP connect → `005` network login → wait for the `505`
    /// login result → `001` status report (the panel then dumps current
    /// zone/partition state through the normal update path).
    pub async fn open(config: &AlarmSystemConfig, core: Arc<SessionCore>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        info!("Connecting to panel at {addr}");

        let stream = timeout(
            Duration::from_millis(config.connect_timeout_ms),
            TcpStream::connect(&addr),
        )
        .await
        .map_err(|_| BridgeError::ConnectionTimeout)?
        .map_err(|e| BridgeError::Connection {
            details: format!("{addr}: {e}"),
        })?;

        let (read_half, write_half) = stream.into_split();
        let gate = Arc::new(CommandGate::new());
        let (closed_tx, closed_rx) = watch::channel(false);
        let (login_tx, login_rx) = watch::channel(None);

        let reader_handle = tokio::spawn(run_reader(
            read_half,
            gate.clone(),
            core,
            login_tx,
            closed_tx,
        ));

        let link = Self {
            gate,
            writer: Mutex::new(write_half),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            closed_rx,
            reader_handle,
        };

        link.login(config, login_rx).await?;
        debug!("Panel login successful");

        match link.send_command(&Command::StatusReport).await? {
            PanelMessage::CommandAck { .. } => {}
            PanelMessage::SystemError { code } => {
                return Err(BridgeError::CommandRejected { code })
            }
            other => {
                return Err(BridgeError::UnexpectedReply {
                    details: format!("{other:?}"),
                })
            }
        }

        info!("Panel link established");
        Ok(link)
    }

    async fn login(
        &self,
        config: &AlarmSystemConfig,
        mut login_rx: watch::Receiver<Option<LoginStatus>>,
    ) -> Result<()> {
        let reply = self
            .send_command(&Command::NetworkLogin {
                password: config.password.clone(),
            })
            .await?;
        if !matches!(reply, PanelMessage::CommandAck { .. }) {
            return Err(BridgeError::UnexpectedReply {
                details: format!("login reply: {reply:?}"),
            });
        }

        // The ack only means the frame was understood; the verdict arrives
        // as a separate 505 interaction.
        let result = timeout(
            self.command_timeout,
            login_rx.wait_for(|s| {
                matches!(
                    s,
                    Some(LoginStatus::Success | LoginStatus::Failed | LoginStatus::Timeout)
                )
            }),
        )
        .await
        .map_err(|_| BridgeError::LoginTimeout)?
        .map_err(|_| BridgeError::NotConnected)?;

        match *result {
            Some(LoginStatus::Success) => Ok(()),
            Some(LoginStatus::Timeout) => Err(BridgeError::LoginTimeout),
            _ => Err(BridgeError::LoginRejected),
        }
    }

    /// Send one command and wait for its terminating reply.
    ///
    /// Fails with `Busy` when another command is already in flight, and
    /// with `CommandTimeout` when the panel does not answer in time.
    pub async fn send_command(&self, command: &Command) -> Result<PanelMessage> {
        let rx = self.gate.begin().await?;
        debug!("Sending command {}", command.code());

        let frame = command.encode();
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.write_all(frame.as_bytes()).await {
                self.gate.cancel().await;
                return Err(BridgeError::Io(e));
            }
        }

        match timeout(self.command_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BridgeError::NotConnected),
            Err(_) => {
                self.gate.cancel().await;
                Err(BridgeError::CommandTimeout {
                    command: command.code().to_string(),
                })
            }
        }
    }

    /// Watch channel that flips to true when the connection dies.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

impl Drop for PanelLink {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Read loop: one frame per line until EOF or I/O error.
async fn run_reader(
    read_half: OwnedReadHalf,
    gate: Arc<CommandGate>,
    core: Arc<SessionCore>,
    login_tx: watch::Sender<Option<LoginStatus>>,
    closed_tx: watch::Sender<bool>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    continue;
                }
                handle_line(line, &gate, &core, &login_tx).await;
            }
            Ok(None) => {
                debug!("Panel closed the connection");
                break;
            }
            Err(e) => {
                error!("Panel read error: {e}");
                break;
            }
        }
    }

    gate.cancel().await;
    let _ = closed_tx.send(true);
    let _ = core.event_tx.send(SessionEvent::Disconnected);
}

async fn handle_line(
    line: &str,
    gate: &CommandGate,
    core: &SessionCore,
    login_tx: &watch::Sender<Option<LoginStatus>>,
) {
    match crate::protocol::parse_message(line) {
        Ok(msg) if msg.is_command_reply() => {
            if !gate.complete(msg.clone()).await {
                debug!("Dropping reply with no command in flight: {msg:?}");
            }
        }
        Ok(PanelMessage::LoginInteraction(status)) => {
            debug!("Login interaction: {status:?}");
            let _ = login_tx.send(Some(status));
        }
        Ok(msg) => {
            let change = core.state.write().await.apply(&msg, Utc::now());
            if let Some(change) = change {
                // Nobody listening is fine; broadcast send only fails then.
                let _ = core.event_tx.send(change.into());
            }
        }
        // Malformed frames are logged and skipped; they never tear down
        // the connection.
        Err(e) => warn!("Ignoring malformed panel frame: {e}"),
    }
}
