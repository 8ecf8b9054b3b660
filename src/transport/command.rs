// MIT License - Copyright (c) 2026 The dsc2smartthings authors

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::protocol::PanelMessage;

/// Single-slot command gate.
///
/// The panel services one command at a time, so the gate holds at most one
/// pending reply channel. A caller that finds the slot occupied gets `Busy`
/// immediately instead of queueing. The read loop resolves the slot with
/// the first command-terminating reply (`500`/`501`/`502`).
pub struct CommandGate {
    pending: Mutex<Option<oneshot::Sender<PanelMessage>>>,
}

impl CommandGate {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    /// Claim the command slot. Must be called before the frame is written so
    /// a fast reply cannot race past the registration.
    pub async fn begin(&self) -> Result<oneshot::Receiver<PanelMessage>> {
        let mut pending = self.pending.lock().await;
        if pending.is_some() {
            return Err(BridgeError::Busy);
        }
        let (tx, rx) = oneshot::channel();
        *pending = Some(tx);
        Ok(rx)
    }

    /// Resolve the pending command with a reply from the panel.
    ///
    /// Returns false when no command was in flight (an unsolicited ack,
    /// which is logged and dropped by the caller).
    pub async fn complete(&self, reply: PanelMessage) -> bool {
        match self.pending.lock().await.take() {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Release the slot without a reply (timeout or link teardown). Any
    /// waiting caller observes a closed channel.
    pub async fn cancel(&self) {
        if self.pending.lock().await.take().is_some() {
            debug!("Cancelled in-flight command");
        }
    }
}

impl Default for CommandGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_begin_is_busy() {
        let gate = CommandGate::new();
        let _rx = gate.begin().await.unwrap();
        assert!(matches!(gate.begin().await, Err(BridgeError::Busy)));
    }

    #[tokio::test]
    async fn test_complete_resolves_pending() {
        let gate = CommandGate::new();
        let rx = gate.begin().await.unwrap();
        assert!(gate.complete(PanelMessage::CommandAck { echoed: "000".into() }).await);
        assert_eq!(
            rx.await.unwrap(),
            PanelMessage::CommandAck { echoed: "000".into() }
        );
        // Slot is free again.
        assert!(gate.begin().await.is_ok());
    }

    #[tokio::test]
    async fn test_complete_without_pending() {
        let gate = CommandGate::new();
        assert!(!gate.complete(PanelMessage::ChecksumRejected).await);
    }

    #[tokio::test]
    async fn test_cancel_closes_channel() {
        let gate = CommandGate::new();
        let rx = gate.begin().await.unwrap();
        gate.cancel().await;
        assert!(rx.await.is_err());
        assert!(gate.begin().await.is_ok());
    }
}
