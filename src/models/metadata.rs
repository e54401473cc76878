//! Metadata recorded by the upload path.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

/// Typed view of the custom metadata the gateway stores with every upload.
///
/// `extra` carries caller-supplied form fields. The injected keys
/// (`uploadedAt`, `fileSize`, `bucket`) always win over an extra field of the
/// same name.
#[derive(Clone, Debug)]
pub struct UploadMetadata {
    pub uploaded_at: DateTime<Utc>,
    pub file_size: u64,
    pub bucket: String,
    pub extra: BTreeMap<String, String>,
}

impl UploadMetadata {
    pub fn new(file_size: u64, bucket: impl Into<String>) -> Self {
        Self {
            uploaded_at: Utc::now(),
            file_size,
            bucket: bucket.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    /// Flatten into the string map handed to the store.
    pub fn into_custom_metadata(self) -> BTreeMap<String, String> {
        let mut map = self.extra;
        map.insert(
            "uploadedAt".into(),
            self.uploaded_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        map.insert("fileSize".into(), self.file_size.to_string());
        map.insert("bucket".into(), self.bucket);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_keys_override_caller_fields() {
        let mut extra = BTreeMap::new();
        extra.insert("bucket".to_string(), "spoofed".to_string());
        extra.insert("originalName".to_string(), "a.txt".to_string());

        let map = UploadMetadata::new(42, "files")
            .with_extra(extra)
            .into_custom_metadata();

        assert_eq!(map["bucket"], "files");
        assert_eq!(map["fileSize"], "42");
        assert_eq!(map["originalName"], "a.txt");
        assert!(map["uploadedAt"].ends_with('Z'));
    }
}
