//! Folder uploads: one file at a time, failures collected, never aborted.

use crate::client::{GatewayClient, UploadRequest};
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use tokio::fs;
use tracing::{info, warn};

/// A local file and the key it will be stored under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFile {
    pub key: String,
    pub path: PathBuf,
}

impl BatchFile {
    /// File name shown in reports (the last path component).
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of a whole batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub success: bool,
    pub total: usize,
    pub uploaded: usize,
    pub errors: Vec<BatchFailure>,
}

/// Progress after each file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchProgress {
    pub done: usize,
    pub uploaded: usize,
    pub total: usize,
}

/// Every regular file below `dir`, keyed by its path relative to the
/// parent of `dir` (so the folder name itself is the first key segment).
/// Sorted by key.
///
/// `dir` is canonicalised first, so `.` or `sub/..` still key files under
/// the folder's real name.
pub async fn collect_folder(dir: &Path) -> io::Result<Vec<BatchFile>> {
    let dir = fs::canonicalize(dir).await?;
    let base = dir.parent().unwrap_or(Path::new(""));
    let mut files = Vec::new();
    let mut pending = vec![dir.clone()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(BatchFile {
                    key: relative_key(&path, base),
                    path,
                });
            }
        }
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

fn relative_key(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Upload `files` strictly in order, waiting for each response before
/// starting the next. A failed file is recorded and the batch moves on.
pub async fn upload_batch<F>(
    client: &GatewayClient,
    files: Vec<BatchFile>,
    bucket: Option<&str>,
    mut on_progress: F,
) -> BatchReport
where
    F: FnMut(BatchProgress),
{
    let total = files.len();
    let mut report = BatchReport {
        total,
        ..Default::default()
    };

    for (idx, file) in files.into_iter().enumerate() {
        let name = file.name();
        let outcome = match fs::read(&file.path).await {
            Ok(data) => client
                .upload(UploadRequest {
                    data: data.into(),
                    file_name: name.clone(),
                    key: Some(file.key.clone()),
                    bucket: bucket.map(str::to_string),
                    ..Default::default()
                })
                .await
                .map(|_| ())
                .map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };

        match outcome {
            Ok(()) => {
                report.uploaded += 1;
                info!(key = %file.key, "uploaded ({}/{})", report.uploaded, total);
            }
            Err(error) => {
                warn!(key = %file.key, "upload failed: {error}");
                report.errors.push(BatchFailure { name, error });
            }
        }

        on_progress(BatchProgress {
            done: idx + 1,
            uploaded: report.uploaded,
            total,
        });
    }

    report.success = report.errors.is_empty();
    report
}
