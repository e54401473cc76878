//! Shared state handed to every handler and middleware.

use crate::{
    middleware::{auth::AuthSettings, cors::CorsSettings},
    services::registry::BucketRegistry,
};
use std::sync::Arc;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub buckets: Arc<BucketRegistry>,
    pub auth: AuthSettings,
    pub cors: CorsSettings,
    /// Upper bound on an upload request body, in bytes.
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(buckets: BucketRegistry) -> Self {
        Self {
            buckets: Arc::new(buckets),
            auth: AuthSettings::default(),
            cors: CorsSettings::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_auth(mut self, auth: AuthSettings) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_cors(mut self, cors: CorsSettings) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = max;
        self
    }
}
