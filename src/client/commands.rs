//! The client subcommands of the binary.

use crate::{
    client::{
        GatewayClient, ListRequest, UploadRequest,
        batch::{BatchFile, collect_folder, upload_batch},
        format::format_bytes,
        view::BrowserState,
    },
    config::ClientConfig,
    models::api::ListResponse,
};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

fn connect(cfg: &ClientConfig) -> Result<GatewayClient> {
    GatewayClient::new(cfg.endpoint.clone(), cfg.token.clone())
        .with_context(|| format!("creating client for {}", cfg.endpoint))
}

/// A single file goes up with progress reporting; anything else (several
/// paths or a directory) becomes a sequential batch.
pub async fn upload(cfg: ClientConfig, paths: Vec<PathBuf>, name: Option<String>) -> Result<()> {
    let client = connect(&cfg)?;

    if let [path] = paths.as_slice() {
        if fs::metadata(path).await?.is_file() {
            return upload_single(&client, &cfg, path, name).await;
        }
    }
    if name.is_some() {
        bail!("--name only applies to a single file upload");
    }

    let mut files = Vec::new();
    for path in &paths {
        if fs::metadata(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?
            .is_dir()
        {
            files.extend(collect_folder(path).await?);
        } else {
            files.push(BatchFile {
                key: file_name_of(path),
                path: path.clone(),
            });
        }
    }

    let report = upload_batch(&client, files, cfg.bucket.as_deref(), |p| {
        info!("uploading multiple files ({}/{})", p.uploaded, p.total);
    })
    .await;

    if report.success {
        println!("Successfully uploaded all {} files", report.total);
        return Ok(());
    }
    println!(
        "Upload complete, but {} of {} files failed:",
        report.errors.len(),
        report.total
    );
    for failure in &report.errors {
        println!("  {}: {}", failure.name, failure.error);
    }
    bail!("{} uploads failed", report.errors.len())
}

async fn upload_single(
    client: &GatewayClient,
    cfg: &ClientConfig,
    path: &Path,
    name: Option<String>,
) -> Result<()> {
    let data = fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file_name = file_name_of(path);

    let mut req = UploadRequest {
        data: data.into(),
        file_name: file_name.clone(),
        key: name,
        bucket: cfg.bucket.clone(),
        ..Default::default()
    };
    req.metadata.insert("originalName".into(), file_name);

    let result = client
        .upload_with_progress(req, |snapshot| info!("{}", snapshot.describe()))
        .await?;
    println!(
        "Uploaded {} ({}, {}) to bucket {}",
        result.file_name,
        format_bytes(result.size as f64),
        result.content_type,
        result.bucket
    );
    Ok(())
}

/// One listed folder and the page the gateway returned for it.
pub type ListedFolder = (BrowserState, ListResponse);

/// List `root`, then (when `recursive`) every folder below it, depth first
/// in listing order. `cursor` only applies to the first page of `root`.
pub async fn browse(
    client: &GatewayClient,
    root: BrowserState,
    limit: Option<usize>,
    cursor: Option<String>,
    recursive: bool,
) -> Result<Vec<ListedFolder>> {
    let mut cursor = cursor;
    let mut pending = vec![root];
    let mut listed = Vec::new();

    while let Some(state) = pending.pop() {
        let page = client
            .list(&ListRequest {
                prefix: state.prefix().to_string(),
                bucket: state.bucket().map(str::to_string),
                limit,
                cursor: cursor.take(),
            })
            .await
            .with_context(|| format!("listing `{}`", state.prefix()))?;

        if recursive {
            for entry in page.files.iter().rev().filter(|e| e.is_folder) {
                let mut child = state.clone();
                child.enter(entry);
                pending.push(child);
            }
        }
        listed.push((state, page));
    }
    Ok(listed)
}

pub async fn list(
    cfg: ClientConfig,
    prefix: String,
    limit: Option<usize>,
    cursor: Option<String>,
    recursive: bool,
) -> Result<()> {
    let client = connect(&cfg)?;
    let root = BrowserState::at(cfg.bucket.clone(), prefix);

    for (state, page) in browse(&client, root, limit, cursor, recursive).await? {
        let crumbs: Vec<_> = state.breadcrumbs().into_iter().map(|c| c.label).collect();
        println!("[{}] {}", page.bucket, crumbs.join(" / "));
        if !state.is_root() {
            let mut parent = state.clone();
            parent.up();
            let target = if parent.is_root() { "/" } else { parent.prefix() };
            println!("  {:>10}  .. ({target})", "<up>");
        }
        if page.files.is_empty() {
            println!("  (empty)");
        }
        for entry in &page.files {
            if entry.is_folder {
                println!("  {:>10}  {}", "<dir>", state.display_name(entry));
            } else {
                println!(
                    "  {:>10}  {}",
                    format_bytes(entry.size as f64),
                    state.display_name(entry)
                );
            }
        }
        if let Some(cursor) = page.cursor.as_deref().filter(|_| page.truncated) {
            println!("more entries in `{}`: --cursor {cursor}", state.prefix());
        }
    }
    Ok(())
}

pub async fn download(cfg: ClientConfig, key: String, output: Option<PathBuf>) -> Result<()> {
    let client = connect(&cfg)?;
    let object = client.download(&key, cfg.bucket.as_deref()).await?;
    let output = output.unwrap_or_else(|| PathBuf::from(key.rsplit('/').next().unwrap_or(&key)));
    fs::write(&output, &object.data)
        .await
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Saved {} ({}) to {}",
        key,
        format_bytes(object.data.len() as f64),
        output.display()
    );
    Ok(())
}

pub async fn delete(cfg: ClientConfig, key: String) -> Result<()> {
    let client = connect(&cfg)?;
    let result = client.delete(&key, cfg.bucket.as_deref()).await?;
    println!("Deleted {} from bucket {}", result.file_name, result.bucket);
    Ok(())
}

pub async fn buckets(cfg: ClientConfig) -> Result<()> {
    let client = connect(&cfg)?;
    let result = client.buckets().await?;
    for bucket in &result.buckets {
        let marker = if result.default.as_deref() == Some(bucket.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("{bucket}{marker}");
    }
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
