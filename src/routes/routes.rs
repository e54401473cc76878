//! Defines the gateway's HTTP surface.
//!
//! ## Structure
//! - **File endpoints** (bearer auth)
//!   - `POST   /upload`       : multipart upload
//!   - `GET    /files/{*key}` : download
//!   - `DELETE /files/{*key}` : delete
//!   - `GET    /list`         : list one page (prefix, delimiter, limit, cursor)
//!   - `GET    /buckets`      : enumerate buckets
//!
//! - **Health checks** (no auth)
//!   - `GET    /healthz`, `GET /readyz`
//!
//! Every route, the fallback included, sits behind the CORS middleware, which
//! also answers `OPTIONS` preflights for any path.
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        file_handlers::{
            delete_file, download_file, list_buckets, list_files, not_found, upload_file,
        },
        health_handlers::{healthz, readyz},
    },
    middleware::{auth::require_token, cors::cors},
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};

/// Build the full router with its state applied.
pub fn routes(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);

    let files = Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files/{*key}", get(download_file).delete(delete_file))
        .route("/list", get(list_files))
        .route("/buckets", get(list_buckets))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    let health = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz));

    Router::new()
        .merge(files)
        .merge(health)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .with_state(state)
}
