//! bytewire command-line client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bytewire_transfer::{ProgressCallback, TransferClient};

/// Throttled file transfer client.
#[derive(Debug, Parser)]
#[command(name = "bytewire", version, about)]
struct Cli {
    /// Base URL of the bytewire server.
    #[arg(long, default_value = "http://127.0.0.1:3001")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file to the server.
    Upload {
        /// Path of the file to send.
        file: PathBuf,
    },
    /// Download a stored file from the server.
    Download {
        /// Stored file name to fetch.
        filename: String,
        /// Local path to write to (defaults to the stored name).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn log_progress(operation: &'static str) -> ProgressCallback {
    Box::new(move |p| {
        tracing::debug!(
            operation,
            bytes = p.bytes_transferred,
            total = p.total_bytes,
            percent = %format!("{:.1}", p.percentage()),
            "progress"
        );
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let client = TransferClient::new(&cli.server);

    match cli.command {
        Command::Upload { file } => {
            let receipt = client.upload(&file, log_progress("upload")).await?;
            tracing::info!(
                filename = receipt.filename.as_deref().unwrap_or(""),
                size = receipt.size.unwrap_or(0),
                "upload complete"
            );
        }
        Command::Download { filename, out } => {
            let bytes = client.download(&filename, log_progress("download")).await?;
            let out = out.unwrap_or_else(|| PathBuf::from(&filename));
            tokio::fs::write(&out, &bytes).await?;
            tracing::info!(path = %out.display(), size = bytes.len(), "download complete");
        }
    }

    Ok(())
}
