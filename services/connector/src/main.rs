//! Connector entry point
//!
//! `connector /producer0/output /consumer0/input` asks the module owning the
//! source path to connect it to the target and waits for the acknowledgment.

use anyhow::{Context, Result};
use clap::Parser;
use module_runtime::ControlClient;
use runtime_config::RuntimeConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Connects an outbound module port to an inbound one", long_about = None)]
struct Args {
    /// Registry path of the outbound port
    source: String,

    /// Registry path of the inbound port
    target: String,

    /// Configuration file; registry and timeouts are read from it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registry address, overrides the configuration
    #[arg(long)]
    registry: Option<String>,

    /// How long to wait for the module's acknowledgment
    #[arg(long)]
    ack_timeout_ms: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    if let Some(registry) = args.registry {
        config.registry.address = registry;
    }
    if let Some(timeout) = args.ack_timeout_ms {
        config.module.ack_timeout_ms = Some(timeout);
    }

    info!(registry = %config.registry.address, "Connecting to registry");
    let mut client = ControlClient::connect(&config)
        .await
        .context("Failed to reach the registry")?;

    client
        .connect_ports(&args.source, &args.target)
        .await
        .with_context(|| format!("Failed to connect {} -> {}", args.source, args.target))?;

    info!(source = %args.source, target = %args.target, "Connected");
    Ok(())
}
