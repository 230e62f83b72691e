//! Stored-object naming and creation.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{File, OpenOptions};

use bytewire_protocol::constants::DEFAULT_FILE_NAME;

/// A freshly created stored object with its open write sink.
pub struct NewObject {
    /// On-disk name, `{timestamp_millis}-{sanitized_name}`. This is the
    /// name reported back to the uploader and accepted by the download
    /// endpoint.
    pub name: String,
    pub path: PathBuf,
    pub file: File,
}

/// Reduces a client-supplied file name to a safe basename.
///
/// Everything up to the last `/` or `\` is stripped; names that reduce to
/// empty, `.` or `..` fall back to the default upload name. The result
/// never contains a path separator, so joining it onto the storage
/// directory cannot escape it.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    match base {
        "" | "." | ".." => DEFAULT_FILE_NAME.to_string(),
        name => name.to_string(),
    }
}

/// Creates a uniquely named storage file for `name`, prefixed with the
/// current timestamp in milliseconds.
pub async fn create_unique(dir: &Path, name: &str) -> io::Result<NewObject> {
    create_unique_from(dir, name, Utc::now().timestamp_millis()).await
}

/// Creation with an explicit starting timestamp. If the slot is taken
/// (two same-named uploads in the same millisecond) the prefix advances
/// until a free one is found, so neither write clobbers the other.
async fn create_unique_from(dir: &Path, name: &str, mut stamp: i64) -> io::Result<NewObject> {
    loop {
        let object_name = format!("{stamp}-{name}");
        let path = dir.join(&object_name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                return Ok(NewObject {
                    name: object_name,
                    path,
                    file,
                });
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
            Err(err) => return Err(err),
        }
    }
}
