//! HTTP handlers for the upload and download endpoints.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use bytewire_protocol::constants::{DEFAULT_FILE_NAME, DOWNLOAD_PATH, FILE_NAME_HEADER, UPLOAD_PATH};
use bytewire_protocol::{ErrorBody, TransferReceipt};

use crate::config::ServerConfig;
use crate::storage::{create_unique, sanitize_file_name};
use crate::throttle::ThrottledStream;

/// Builds the application router over the shared configuration.
pub fn router(config: Arc<ServerConfig>) -> Router {
    Router::new()
        .route(UPLOAD_PATH, post(handle_upload))
        .route(&format!("{DOWNLOAD_PATH}/{{filename}}"), get(handle_download))
        .with_state(config)
}

/// Receives an upload: inbound body -> throttle -> storage sink.
///
/// Bytes are counted as they exit the throttle, so the reported size
/// growth matches the actual write rate. On any mid-stream failure the
/// sink is destroyed and the partial file is removed.
async fn handle_upload(
    State(config): State<Arc<ServerConfig>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let raw_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            percent_encoding::percent_decode_str(v)
                .decode_utf8()
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| v.to_string())
        })
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());
    let file_name = sanitize_file_name(&raw_name);

    let object = match create_unique(&config.storage_dir, &file_name).await {
        Ok(object) => object,
        Err(err) => {
            warn!(%err, filename = %file_name, "upload: unable to open storage sink");
            return upload_failure(err.to_string());
        }
    };

    let inbound = body.into_data_stream().map_err(io::Error::other);
    let mut throttled = ThrottledStream::new(inbound, config.throttle_bytes_per_sec);

    match receive_into(object.file, &mut throttled).await {
        Ok(size) => {
            info!(filename = %object.name, size, "upload stored");
            (
                StatusCode::OK,
                Json(TransferReceipt::completed(object.name, size)),
            )
                .into_response()
        }
        Err(err) => {
            // Abort the partial write; an orphaned fragment must not
            // linger in storage.
            if let Err(remove_err) = tokio::fs::remove_file(&object.path).await {
                warn!(%remove_err, path = %object.path.display(), "upload: partial file not removed");
            }
            warn!(%err, filename = %object.name, "upload failed mid-stream");
            upload_failure(err.to_string())
        }
    }
}

/// Drains the throttled inbound stream into the sink, returning the
/// post-throttle byte count.
async fn receive_into<S>(mut file: tokio::fs::File, stream: &mut S) -> io::Result<u64>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut total: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(total)
}

/// Serves a stored object: storage read stream -> throttle -> response.
///
/// The requested name gets the same basename sanitization as uploads, so
/// a crafted segment can never resolve outside the storage directory.
async fn handle_download(
    State(config): State<Arc<ServerConfig>>,
    Path(filename): Path<String>,
) -> Response {
    let file_name = sanitize_file_name(&filename);
    let path = config.storage_dir.join(&file_name);

    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorBody::new("File not found")),
            )
                .into_response();
        }
        Err(err) => {
            warn!(%err, filename = %file_name, "download: stat failed");
            return download_failure(err.to_string());
        }
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            warn!(%err, filename = %file_name, "download: open failed");
            return download_failure(err.to_string());
        }
    };

    info!(filename = %file_name, size = meta.len(), "download streaming");

    // Fresh throttle per request; concurrent downloads don't share state.
    let throttled = ThrottledStream::new(ReaderStream::new(file), config.throttle_bytes_per_sec);

    match Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, meta.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        )
        .body(Body::from_stream(throttled))
    {
        Ok(response) => response,
        Err(err) => {
            warn!(%err, filename = %file_name, "download: response build failed");
            download_failure(err.to_string())
        }
    }
}

fn upload_failure(error: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(TransferReceipt::failed(error)),
    )
        .into_response()
}

fn download_failure(error: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(error)),
    )
        .into_response()
}
