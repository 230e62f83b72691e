//! Upload pipeline: local file -> progress observer -> request body.

use std::path::Path;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use bytewire_protocol::TransferReceipt;
use bytewire_protocol::constants::{DEFAULT_FILE_NAME, FILE_NAME_HEADER, UPLOAD_PATH};

use crate::TransferError;
use crate::capability::{TransportProbe, UploadStrategy, negotiate_strategy};
use crate::progress::{ProgressCallback, ProgressStream, TransferDescriptor};

/// Read size for the buffered fallback path.
const FALLBACK_CHUNK_SIZE: usize = 64 * 1024;

/// `encodeURIComponent`-compatible set: alphanumerics and `-_.!~*'()`
/// stay unescaped.
const FILE_NAME_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encodes a file name for the `X-File-Name` header or a URL
/// path segment.
pub(crate) fn encode_file_name(name: &str) -> String {
    utf8_percent_encode(name, FILE_NAME_ENCODE).to_string()
}

/// Uploads the file at `path` to the server at `base_url`.
///
/// Each chunk leaving the local file is observed by `on_progress` before
/// it reaches the transport. The transmission strategy (streamed vs
/// buffered) is negotiated once via `probe`; in streamed mode no more
/// than one chunk of the payload is held in memory at a time.
pub async fn upload_file(
    http: &reqwest::Client,
    base_url: &str,
    path: &Path,
    probe: &dyn TransportProbe,
    on_progress: ProgressCallback,
) -> Result<TransferReceipt, TransferError> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_FILE_NAME);

    let descriptor = TransferDescriptor::new(size, on_progress);
    let body = match negotiate_strategy(probe) {
        UploadStrategy::Streaming => {
            let stream = ProgressStream::new(ReaderStream::new(file), descriptor);
            reqwest::Body::wrap_stream(stream)
        }
        UploadStrategy::Buffered => {
            reqwest::Body::from(buffer_payload(file, size, descriptor).await?)
        }
    };

    let url = format!("{}{}", base_url.trim_end_matches('/'), UPLOAD_PATH);
    debug!(%url, file = %path.display(), size, "starting upload");

    let response = http
        .post(&url)
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(CONTENT_LENGTH, size)
        .header(FILE_NAME_HEADER, encode_file_name(file_name))
        .body(body)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(TransferError::Upload(crate::status_text(response.status())));
    }

    Ok(response.json::<TransferReceipt>().await?)
}

/// Fallback path: reads the whole file into memory chunk-wise, still
/// feeding the progress observer, and returns the materialized payload.
async fn buffer_payload(
    mut file: tokio::fs::File,
    size: u64,
    mut descriptor: TransferDescriptor,
) -> Result<Vec<u8>, TransferError> {
    let mut payload = Vec::with_capacity(size as usize);
    let mut buf = vec![0u8; FALLBACK_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        payload.extend_from_slice(&buf[..n]);
        descriptor.record_chunk(n);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn file_name_encoding_matches_uri_component() {
        assert_eq!(encode_file_name("plain.bin"), "plain.bin");
        assert_eq!(encode_file_name("my file (1).bin"), "my%20file%20(1).bin");
        assert_eq!(encode_file_name("a+b&c.bin"), "a%2Bb%26c.bin");
        assert_eq!(encode_file_name("na\u{ef}ve.txt"), "na%C3%AFve.txt");
    }

    #[tokio::test]
    async fn buffer_payload_reads_all_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let data: Vec<u8> = (0..200_000).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let descriptor = TransferDescriptor::new(
            data.len() as u64,
            Box::new(move |p| sink.lock().unwrap().push(p)),
        );

        let file = tokio::fs::File::open(&path).await.unwrap();
        let payload = buffer_payload(file, data.len() as u64, descriptor)
            .await
            .unwrap();
        assert_eq!(payload, data);

        let events = events.lock().unwrap();
        // 200 000 bytes through 64 KiB reads: several chunks, not one.
        assert!(events.len() >= 4);
        assert_eq!(events.last().unwrap().bytes_transferred, data.len() as u64);
        assert_eq!(events.last().unwrap().percentage(), 100.0);
    }

    #[tokio::test]
    async fn buffer_payload_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").unwrap();

        let descriptor = TransferDescriptor::new(0, Box::new(|_| {}));
        let file = tokio::fs::File::open(&path).await.unwrap();
        let payload = buffer_payload(file, 0, descriptor).await.unwrap();
        assert!(payload.is_empty());
    }
}
