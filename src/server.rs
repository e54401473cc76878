//! Server bootstrap: turn an `AppConfig` into a bound, running router.

use crate::{
    config::{AppConfig, BackendKind},
    middleware::{auth::AuthSettings, cors::CorsSettings},
    routes::routes::routes,
    services::{
        fs_backend::{FsBackend, open_metadata_pool},
        memory_backend::MemoryBackend,
        registry::BucketRegistry,
        storage_backend::StorageBackend,
    },
    state::AppState,
};
use anyhow::{Context, Result};
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;

/// Create one backend per configured bucket.
pub async fn build_registry(cfg: &AppConfig) -> Result<BucketRegistry> {
    let mut registry = BucketRegistry::new();

    match cfg.backend {
        BackendKind::Memory => {
            for name in &cfg.buckets {
                registry.register(name.clone(), Arc::new(MemoryBackend::new()))?;
            }
        }
        BackendKind::Fs => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            let db = open_metadata_pool(&cfg.database_url)
                .await
                .with_context(|| format!("opening metadata database {}", cfg.database_url))?;
            for name in &cfg.buckets {
                let backend: Arc<dyn StorageBackend> =
                    Arc::new(FsBackend::new(db.clone(), &cfg.storage_dir, name.clone()));
                registry.register(name.clone(), backend)?;
            }
        }
    }

    if let Some(default) = cfg.default_bucket.as_deref() {
        registry.set_default(default)?;
    }
    Ok(registry)
}

/// Build the complete application for `cfg`.
pub async fn build_app(cfg: &AppConfig) -> Result<Router> {
    let registry = build_registry(cfg).await?;
    tracing::info!(
        buckets = ?registry.names(),
        default = ?registry.default_name(),
        "buckets ready"
    );
    if cfg.api_token.is_none() {
        tracing::warn!("API_TOKEN is not set; authentication is disabled");
    }

    let state = AppState::new(registry)
        .with_auth(AuthSettings::new(cfg.api_token.clone()))
        .with_cors(CorsSettings::from_list(&cfg.allowed_origins))
        .with_max_upload_bytes(cfg.max_upload_bytes);
    Ok(routes(state))
}

/// Bind and serve until the process is stopped.
pub async fn run(cfg: AppConfig) -> Result<()> {
    let app = build_app(&cfg).await?;

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
