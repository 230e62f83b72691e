//! Throttled HTTP file transfer server.
//!
//! Receives uploads on `POST /api/upload` and serves stored objects on
//! `GET /api/download/{filename}`. Every byte stream, inbound and
//! outbound, passes through a per-request [`throttle::ThrottledStream`],
//! so upload byte counts and download delivery both reflect the throttled
//! rate rather than the source rate.

pub mod config;
pub mod handler;
pub mod server;
pub mod storage;
pub mod throttle;

pub use config::ServerConfig;
pub use server::Server;
pub use throttle::{DEFAULT_BYTES_PER_SEC, THROTTLE_WINDOW, ThrottleState, ThrottledStream};

/// Errors produced by the server run loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
