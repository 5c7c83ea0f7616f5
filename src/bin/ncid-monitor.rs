//! NCID monitor binary
//!
//! Connects to an NCID server and logs every call-state change until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ncid_tokio::{
    CallDirection, CallObserver, CallPresence, CallState, CallerIdentity, ConnectionStatus,
    NcidConfig, NcidError, NcidSession,
};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ncid-monitor")]
#[command(about = "Track call presence from an NCID caller-ID server")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// NCID server host
    #[arg(long)]
    host: Option<String>,

    /// NCID server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Display name of the monitored line
    #[arg(short, long)]
    name: Option<String>,
}

impl Cli {
    fn into_config(self) -> Result<NcidConfig, NcidError> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                NcidConfig::from_json_str(&text)?
            }
            None => NcidConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(name) = self.name {
            config.display_name = name;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Logs notifications as structured events.
struct LogObserver;

impl CallObserver for LogObserver {
    fn on_state_changed(&self, state: CallState) {
        info!(state = %state, icon = state.icon(), "state changed");
    }

    fn on_call_identified(&self, direction: CallDirection, identity: &CallerIdentity) {
        info!(
            direction = %direction,
            name = identity.name.as_deref().unwrap_or("-"),
            number = identity.number.as_deref().unwrap_or("-"),
            "call identified"
        );
    }

    fn on_connection_status(&self, status: ConnectionStatus) {
        info!(status = %status, "gateway link");
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        name = %config.display_name,
        "Starting NCID monitor"
    );

    let session = match NcidSession::spawn(config, Arc::new(LogObserver)) {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to start session: {}", e);
            std::process::exit(1);
        }
    };

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    let last = session.snapshot();
    info!(
        state = %last.state,
        last_caller = %last.identity,
        connection = %session.connection_status(),
        "Shutting down"
    );
    session
        .stop()
        .await;
}
