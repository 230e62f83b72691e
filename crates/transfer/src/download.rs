//! Download pipeline: response body -> progress observer -> byte buffer.

use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use tracing::debug;

use crate::TransferError;
use crate::progress::{ProgressCallback, TransferDescriptor};

/// Downloads `url`, accumulating the body into a single byte buffer.
///
/// The total size is taken from `content-length` (0 = unknown, in which
/// case progress events report 0%). The response byte stream is scoped to
/// this call, so it is released on every exit path.
pub async fn download_file(
    http: &reqwest::Client,
    url: &str,
    on_progress: ProgressCallback,
) -> Result<Vec<u8>, TransferError> {
    let response = http.get(url).send().await?;

    if !response.status().is_success() {
        return Err(TransferError::Download(crate::status_text(
            response.status(),
        )));
    }

    let total = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    debug!(%url, total, "starting download");

    let mut descriptor = TransferDescriptor::new(total, on_progress);
    let mut payload: Vec<u8> = Vec::with_capacity(total as usize);

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        payload.extend_from_slice(&chunk);
        descriptor.record_chunk(chunk.len());
    }

    Ok(payload)
}
