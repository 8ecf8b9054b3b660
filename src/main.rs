// MIT License - Copyright (c) 2026 The dsc2smartthings authors
// Alarm monitoring service

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use envisalink_bridge::http::{router, AppState};
use envisalink_bridge::{
    AlarmSession, AlarmSystemConfig, AuthBridge, ConfigRepository, FileAccountStore,
    IntegrationBridge, IntegrationConfig, OauthCredential, SessionStatus,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "dsc2smartthings")]
#[command(about = "Bridge between a DSC alarm panel and SmartThings")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    /// Directory holding AlarmSystemInfo.json, SmartThings.json and
    /// Accounts.json
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    integration: IntegrationToml,
    #[serde(default, deserialize_with = "deserialize_zone_names")]
    zone_names: HashMap<u32, String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:2064".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn deserialize_zone_names<'de, D>(deserializer: D) -> Result<HashMap<u32, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u32>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid zone ID: {k}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct IntegrationToml {
    endpoint_url: String,
    token_url: String,
    #[serde(default = "default_request_timeout")]
    request_timeout_ms: u64,
}

fn default_request_timeout() -> u64 {
    10_000
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or
    // RUST_LOG=envisalink_bridge=trace). Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running
    // under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    // The JSON repositories are the source of truth for panel connection
    // parameters and OAuth state; the TOML file only wires the process.
    let alarm_repo: ConfigRepository<AlarmSystemConfig> =
        ConfigRepository::new(config.data_dir.join("AlarmSystemInfo.json"));
    let oauth_repo: Arc<ConfigRepository<OauthCredential>> =
        Arc::new(ConfigRepository::new(config.data_dir.join("SmartThings.json")));
    let accounts = Arc::new(FileAccountStore::new(config.data_dir.join("Accounts.json")));

    let panel_config = alarm_repo.get().await?;
    info!(
        "Connecting to alarm panel at {}:{}",
        panel_config.host, panel_config.port
    );
    let session = Arc::new(AlarmSession::new(panel_config));
    session
        .start()
        .await
        .context("Failed to connect to alarm panel")?;
    info!("Alarm session running");

    let integration = Arc::new(IntegrationBridge::new(
        IntegrationConfig {
            endpoint_url: config.integration.endpoint_url,
            token_url: config.integration.token_url,
            request_timeout: std::time::Duration::from_millis(
                config.integration.request_timeout_ms,
            ),
        },
        oauth_repo,
    )?);
    let integration_handle = tokio::spawn(integration.run(session.subscribe()));

    let state = AppState {
        session: session.clone(),
        auth: Arc::new(AuthBridge::new(accounts)),
        zone_names: Arc::new(config.zone_names),
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("HTTP API listening on {}", config.listen_addr);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut status_rx = session.watch_status();
    let shutdown = async move {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down...");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    break;
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *status_rx.borrow() == SessionStatus::Failed {
                        error!("Alarm session failed, shutting down");
                        break;
                    }
                }
            }
        }
    };

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    integration_handle.abort();
    let failed = session.status() == SessionStatus::Failed;
    session.shutdown().await;

    if failed {
        anyhow::bail!("alarm session failed after exhausting reconnect attempts");
    }
    info!("Shutdown complete");
    Ok(())
}
