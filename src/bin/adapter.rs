use anyhow::Result;
use clap::Parser;
use riden::config::{DEFAULT_GATEWAY_URL, DEFAULT_LOGIC_ENDPOINT};
use riden::{Adapter, AdapterConfig, Tripwire, logging};
use std::path::PathBuf;
use tracing::info;

/// Bridge the riden gateway and the trip logic service.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Directory for adapter.log. Logs go to stderr when unset.
    #[arg(long, env = "RIDEN_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "RIDEN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// WebSocket URL of the gateway's adapter path.
    #[arg(long, env = "RIDEN_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway_url: String,

    /// gRPC endpoint of the trip logic service.
    #[arg(long, env = "RIDEN_LOGIC_ENDPOINT", default_value = DEFAULT_LOGIC_ENDPOINT)]
    logic_endpoint: String,

    /// Status codes (or patterns like 5xx) for which a refused upgrade is retried.
    #[arg(long, env = "RIDEN_RETRY_CODES", value_delimiter = ',', default_value = "500")]
    retry_codes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_dir.as_deref(), "adapter", &args.log_level)?;

    let config = AdapterConfig::builder()
        .gateway_url(args.gateway_url)
        .logic_endpoint(args.logic_endpoint)
        .retry_codes(args.retry_codes)
        .build();
    let adapter = Adapter::new(config)?;

    let shutdown = Tripwire::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            interrupt.trip(());
        }
    });

    adapter.run(shutdown).await?;
    Ok(())
}
