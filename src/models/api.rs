//! JSON bodies exchanged between the HTTP handlers and the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub file_name: String,
    pub size: u64,
    pub content_type: String,
    pub bucket: String,
    pub url: String,
    #[serde(default)]
    pub is_from_folder_upload: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub file_name: String,
    pub bucket: String,
    #[serde(default)]
    pub message: String,
}

/// A row of the file browser: either a stored object or a synthetic folder.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub bucket: String,
    pub is_folder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<BTreeMap<String, String>>,
}

impl FileEntry {
    pub fn folder(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            uploaded: None,
            etag: None,
            bucket: bucket.into(),
            is_folder: true,
            content_type: None,
            custom_metadata: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub files: Vec<FileEntry>,
    pub current_prefix: String,
    pub bucket: String,
    pub truncated: bool,
    pub cursor: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BucketsResponse {
    pub success: bool,
    pub buckets: Vec<String>,
    pub default: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}
