//! Name server entry point

use anyhow::Result;
use clap::Parser;
use name_server::{NameServer, NameServerConfig};
use runtime_config::defaults;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Resolves module port paths to network endpoints", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = defaults::name_server::BIND_ADDRESS)]
    bind: String,

    /// Host advertised in resolved records
    #[arg(long, default_value = defaults::name_server::ADVERTISED_HOST)]
    host: String,

    /// First port handed out; 0 lets the OS pick free ports
    #[arg(long, default_value_t = defaults::name_server::PORT_BASE)]
    port_base: u16,

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

    info!("Starting name server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = NameServerConfig {
        bind_address: args.bind,
        advertised_host: args.host,
        port_base: (args.port_base != 0).then_some(args.port_base),
        ..Default::default()
    };
    let server = NameServer::bind(config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down name server");
            Ok(())
        }
    }
}
