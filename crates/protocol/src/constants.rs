//! Protocol-wide constants.

/// Request header carrying the percent-encoded original file name.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Upload endpoint path.
pub const UPLOAD_PATH: &str = "/api/upload";

/// Download endpoint path prefix; the file name is appended as a segment.
pub const DOWNLOAD_PATH: &str = "/api/download";

/// Name used when a client sends no (or an undecodable) `X-File-Name`.
pub const DEFAULT_FILE_NAME: &str = "uploaded-file";
