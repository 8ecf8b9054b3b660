// MIT License - Copyright (c) 2026 The dsc2smartthings authors

//! # envisalink-bridge
//!
//! Direct TCP/IP communication with DSC alarm panels through an Envisalink
//! IP module, plus the collaborators a monitoring service needs around it:
//! file-backed configuration repositories, a SmartThings event forwarder,
//! and a claims-based authentication gate for the HTTP control API.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use envisalink_bridge::{AlarmSession, AlarmSystemConfig, ArmMode, SessionEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AlarmSystemConfig::builder()
//!         .host("192.168.1.100")
//!         .password("user")
//!         .user_code("1234")
//!         .build();
//!
//!     let session = Arc::new(AlarmSession::new(config));
//!     session.start().await?;
//!
//!     let mut events = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     session.arm_partition(1, ArmMode::Away).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod http;
pub mod integration;
pub mod protocol;
pub mod repository;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use auth::{Account, AccountStore, AuthBridge, FileAccountStore, Identity, ARM_DISARM_CLAIM};
pub use config::{AlarmSystemConfig, AlarmSystemConfigBuilder, ArmMode, OauthCredential};
pub use error::{BridgeError, Result};
pub use event::{EventReceiver, PartitionChangeEvent, SessionEvent, ZoneChangeEvent};
pub use integration::{IntegrationBridge, IntegrationConfig};
pub use repository::ConfigRepository;
pub use session::{AlarmSession, SessionStatus};
pub use state::{AlarmState, PartitionStatus, ZoneStatus};
