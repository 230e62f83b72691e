use serde::{Deserialize, Serialize};

/// Outcome of an upload, as returned by `POST /api/upload`.
///
/// Success carries `filename` and `size`; failure carries `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransferReceipt {
    /// Receipt for a completed upload.
    pub fn completed(filename: impl Into<String>, size: u64) -> Self {
        Self {
            success: true,
            filename: Some(filename.into()),
            size: Some(size),
            error: None,
        }
    }

    /// Receipt for a failed upload.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            filename: None,
            size: None,
            error: Some(error.into()),
        }
    }
}

/// Error envelope returned by the download endpoint (404/500).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// A progress event observed while bytes move through a transfer pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    /// Bytes moved so far. Monotonically increasing within one transfer.
    pub bytes_transferred: u64,
    /// Total expected bytes; 0 when unknown (e.g. no content-length).
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Returns the progress as a percentage (0-100), 0 when the total
    /// is unknown.
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0
    }
}
