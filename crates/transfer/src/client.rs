//! High-level transfer client bound to one server base URL.

use std::path::Path;

use bytewire_protocol::TransferReceipt;
use bytewire_protocol::constants::DOWNLOAD_PATH;

use crate::capability::{NativeProbe, TransportProbe};
use crate::progress::ProgressCallback;
use crate::{TransferError, download, upload};

/// HTTP client for uploads and downloads against one bytewire server.
pub struct TransferClient {
    http: reqwest::Client,
    base_url: String,
    probe: Box<dyn TransportProbe>,
}

impl TransferClient {
    /// Creates a client using the native transport probe.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_probe(base_url, Box::new(NativeProbe))
    }

    /// Creates a client with an injected transport probe. Tests use this
    /// to simulate transports that cannot stream request bodies.
    pub fn with_probe(base_url: impl Into<String>, probe: Box<dyn TransportProbe>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            probe,
        }
    }

    /// Uploads the file at `path`, reporting per-chunk progress.
    pub async fn upload(
        &self,
        path: &Path,
        on_progress: ProgressCallback,
    ) -> Result<TransferReceipt, TransferError> {
        upload::upload_file(
            &self.http,
            &self.base_url,
            path,
            self.probe.as_ref(),
            on_progress,
        )
        .await
    }

    /// Downloads the stored object `file_name`, returning its bytes.
    pub async fn download(
        &self,
        file_name: &str,
        on_progress: ProgressCallback,
    ) -> Result<Vec<u8>, TransferError> {
        let url = format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            DOWNLOAD_PATH,
            upload::encode_file_name(file_name)
        );
        download::download_file(&self.http, &url, on_progress).await
    }
}
