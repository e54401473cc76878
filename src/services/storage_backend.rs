//! The seam between HTTP handlers and whatever actually holds the bytes.

use crate::models::{
    listing::{ListOptions, ListPage},
    object::{ObjectBody, ObjectMeta, PutOptions},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("corrupt metadata for `{key}`: {source}")]
    Metadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A key-value blob store addressed by string keys.
///
/// Keys are opaque to the store; `/` only matters to `list` when it is used
/// as the delimiter.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<ObjectMeta>;

    /// Open an object for reading. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> StorageResult<Option<ObjectBody>>;

    /// Remove an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// One page of a prefix listing.
    async fn list(&self, opts: &ListOptions) -> StorageResult<ListPage>;

    /// Readiness check.
    async fn check(&self) -> StorageResult<()>;
}

/// Keys the stores refuse outright. `char::MAX` is reserved as the upper
/// bound of prefix ranges.
pub(crate) fn ensure_key_valid(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.contains('\0')
        || key.contains(char::MAX)
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub(crate) const MAX_OBJECT_KEY_LEN: usize = 1024;

pub(crate) fn compute_etag(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}
