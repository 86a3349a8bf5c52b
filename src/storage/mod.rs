mod local;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use self::local::LocalObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("The resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    /// Overwrite an existing object at the same path instead of failing.
    pub upsert: bool,
}

/// Object storage for uploaded media and avatars.
///
/// Paths are relative, `/`-separated keys such as `{user}/{post}/{file}`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `path`. Returns the stored path.
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<String, StorageError>;

    async fn download(&self, path: &str) -> Result<Bytes, StorageError>;

    /// Remove every listed object. Missing objects are ignored.
    async fn remove(&self, paths: &[String]) -> Result<(), StorageError>;

    /// URL under which `path` is publicly reachable.
    fn public_url(&self, path: &str) -> String;
}

/// Reject keys that are empty, absolute, or try to climb out of the bucket.
pub fn validate_path(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Extension of an uploaded file name, lowercased, without the dot.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
