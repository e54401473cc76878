//! Represents an object (file) stored in a bucket.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, io};

/// Byte stream handed out by a backend when an object is read.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// System and custom metadata of a single stored object.
///
/// The struct describes an object, never its content bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// When the current version of the object was written.
    pub uploaded: DateTime<Utc>,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// Content type (MIME type) recorded at upload time.
    pub content_type: Option<String>,

    /// Caller-supplied key/value pairs stored next to the object.
    pub custom_metadata: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// ETag in its quoted HTTP header form.
    pub fn http_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }

    /// Last path segment of the key.
    pub fn base_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Options accepted by `StorageBackend::put`.
#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub custom_metadata: BTreeMap<String, String>,
}

/// An object opened for reading: its metadata plus the payload stream.
pub struct ObjectBody {
    pub meta: ObjectMeta,
    pub body: ByteStream,
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBody")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
