//! bytewire server daemon.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bytewire_server::{DEFAULT_BYTES_PER_SEC, Server, ServerConfig};

/// Throttled file transfer server.
#[derive(Debug, Parser)]
#[command(name = "bytewired", version, about)]
struct Options {
    /// TCP port to listen on.
    #[arg(short, long, default_value_t = 3001)]
    port: u16,

    /// Directory where uploaded files are stored.
    #[arg(short, long, default_value = "uploads")]
    storage_dir: PathBuf,

    /// Throttle ceiling per transfer, in bytes per second.
    #[arg(long, default_value_t = DEFAULT_BYTES_PER_SEC)]
    throttle: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Options::parse();
    let server = Server::new(ServerConfig {
        port: opts.port,
        storage_dir: opts.storage_dir,
        throttle_bytes_per_sec: opts.throttle,
    });

    // Ctrl-C triggers graceful shutdown.
    let shutdown = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
