//! Named storage backends ("buckets") the gateway serves.
//!
//! The registry is built once at startup from configuration. Handlers never
//! see an unknown bucket: `resolve` falls back to the default.

use crate::services::storage_backend::StorageBackend;
use std::sync::Arc;
use thiserror::Error;

const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("bucket `{0}` registered twice")]
    Duplicate(String),
    #[error("default bucket `{0}` is not registered")]
    UnknownDefault(String),
}

/// A bucket chosen for one request.
#[derive(Clone)]
pub struct ResolvedBucket {
    pub name: String,
    pub backend: Arc<dyn StorageBackend>,
}

#[derive(Clone, Default)]
pub struct BucketRegistry {
    buckets: Vec<ResolvedBucket>,
    default: Option<usize>,
}

impl BucketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bucket. The first bucket registered becomes the default
    /// unless `set_default` picks another one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        validate_bucket_name(&name)?;
        if self.position(&name).is_some() {
            return Err(RegistryError::Duplicate(name));
        }
        self.buckets.push(ResolvedBucket { name, backend });
        Ok(())
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), RegistryError> {
        let idx = self
            .position(name)
            .ok_or_else(|| RegistryError::UnknownDefault(name.to_string()))?;
        self.default = Some(idx);
        Ok(())
    }

    /// Bucket names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.name.clone()).collect()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_bucket().map(|b| b.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedBucket> {
        self.position(name).map(|idx| &self.buckets[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedBucket> {
        self.buckets.iter()
    }

    /// Pick the requested bucket when it exists, otherwise the default.
    /// `None` only when nothing is registered.
    pub fn resolve(&self, requested: Option<&str>) -> Option<ResolvedBucket> {
        requested
            .filter(|name| !name.is_empty())
            .and_then(|name| self.get(name))
            .or_else(|| self.default_bucket())
            .cloned()
    }

    fn default_bucket(&self) -> Option<&ResolvedBucket> {
        self.buckets.get(self.default.unwrap_or(0))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.name == name)
    }
}

/// Validate a bucket name before it becomes a directory and a query value.
///
/// - 1–63 characters
/// - ASCII letters, digits, `-`, `_` and `.`
/// - cannot start with `.` or contain `..`
fn validate_bucket_name(name: &str) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    if name.is_empty() || name.len() > BUCKET_NAME_MAX_LEN {
        return Err(invalid("must be between 1 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            "allowed characters are letters, digits, dots, hyphens and underscores",
        ));
    }
    if name.starts_with('.') || name.contains("..") {
        return Err(invalid("cannot start with a dot or contain consecutive dots"));
    }
    Ok(())
}
