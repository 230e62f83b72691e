//! Server configuration.

use std::path::PathBuf;

use crate::throttle::DEFAULT_BYTES_PER_SEC;

/// Process-wide configuration, constructed at startup and passed into the
/// handlers. Nothing here is mutated after construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Directory where uploaded objects are stored.
    pub storage_dir: PathBuf,
    /// Throttle ceiling applied to each streamed transfer, in bytes/sec.
    pub throttle_bytes_per_sec: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            storage_dir: PathBuf::from("uploads"),
            throttle_bytes_per_sec: DEFAULT_BYTES_PER_SEC,
        }
    }
}
