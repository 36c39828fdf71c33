use anyhow::Result;
use clap::Parser;
use riden::logging;
use riden_gateway::{Gateway, GatewayConfig};
use std::path::PathBuf;
use tracing::info;

/// Serve the riden WebSocket gateway.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Directory for gateway.log. Logs go to stderr when unset.
    #[arg(long, env = "RIDEN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "RIDEN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "RIDEN_HOST", default_value = "localhost")]
    host: String,

    #[arg(long, env = "RIDEN_PORT", default_value_t = 8081)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_dir.as_deref(), "gateway", &args.log_level)?;

    let config = GatewayConfig::builder()
        .host(args.host)
        .port(args.port)
        .build();
    let gateway = Gateway::new(config);

    tokio::select! {
        result = gateway.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    Ok(())
}
