//! Client-side transfer pipelines with live progress reporting.
//!
//! The upload pipeline streams a local file into a `POST /api/upload`
//! request body, observing every chunk through [`ProgressStream`]. Whether
//! the body is actually streamed or buffered first is decided once per
//! upload by the capability negotiation in [`capability`]. The download
//! pipeline reads a response body chunk-by-chunk into memory with the same
//! progress observer contract.

pub mod capability;
pub mod client;
pub mod download;
pub mod progress;
pub mod upload;

pub use capability::{NativeProbe, ProbeRequest, TransportProbe, UploadStrategy, negotiate_strategy};
pub use client::TransferClient;
pub use download::download_file;
pub use progress::{ProgressCallback, ProgressStream, TransferDescriptor};
pub use upload::upload_file;

/// Errors produced by the transfer pipelines.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// Human-readable text for a non-success HTTP status.
pub(crate) fn status_text(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_owned)
        .unwrap_or_else(|| status.to_string())
}
