//! HTTP handlers for the file operations: upload, download, delete, list
//! and bucket discovery. Each one resolves a bucket, performs a single store
//! call and serialises the result.

use crate::{
    errors::AppError,
    models::{
        api::{BucketsResponse, DeleteResponse, FileEntry, ListResponse, UploadResponse},
        listing::{DEFAULT_LIST_LIMIT, ListOptions, MAX_LIST_LIMIT},
        metadata::UploadMetadata,
        object::{ObjectMeta, PutOptions},
    },
    services::registry::ResolvedBucket,
    state::AppState,
    utils::file_names::{OCTET_STREAM, content_type_for, derive_object_key},
};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

const FILE_FIELD: &str = "file";
const FILE_NAME_FIELD: &str = "fileName";
const BUCKET_FIELD: &str = "bucket";
const CACHE_CONTROL: &str = "public, max-age=31536000";

/// `?bucket=` accepted by the single-object routes.
#[derive(Debug, Deserialize)]
pub struct BucketQuery {
    pub bucket: Option<String>,
}

/// Query params accepted by `GET /list`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Parsed leniently: anything that is not a positive integer means default.
    pub limit: Option<String>,
    pub cursor: Option<String>,
    pub bucket: Option<String>,
}

/// The file part of an upload form.
struct FilePart {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

/// POST `/upload`: multipart upload.
///
/// Fields: `file` (required, binary), `fileName` (optional explicit key,
/// may contain `/`), `bucket` (optional). Every other text field is kept as
/// custom metadata.
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > state.max_upload_bytes) {
        return Err(too_large(state.max_upload_bytes));
    }

    let mut multipart = multipart.map_err(|rejection| {
        AppError::bad_request(format!(
            "Failed to parse form data: {}",
            rejection.body_text()
        ))
    })?;

    let mut file: Option<FilePart> = None;
    let mut requested_name: Option<String> = None;
    let mut requested_bucket: Option<String> = None;
    let mut extra = BTreeMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| form_error(err, state.max_upload_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        if name == FILE_FIELD && file_name.is_some() {
            let content_type = field
                .content_type()
                .filter(|ct| !ct.is_empty())
                .map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|err| form_error(err, state.max_upload_bytes))?;
            file = Some(FilePart {
                file_name,
                content_type,
                data,
            });
            continue;
        }
        if file_name.is_some() {
            debug!(field = %name, "ignoring extra file field");
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| form_error(err, state.max_upload_bytes))?;
        match name.as_str() {
            FILE_NAME_FIELD => requested_name = Some(value),
            FILE_FIELD => {}
            _ => {
                if name == BUCKET_FIELD {
                    requested_bucket = Some(value.clone());
                }
                extra.insert(name, value);
            }
        }
    }

    let file = file.ok_or_else(|| AppError::bad_request("No file or invalid file provided"))?;
    let is_from_folder_upload = requested_name.is_some();

    let key = derive_object_key(requested_name.as_deref(), file.file_name.as_deref());
    let content_type = file
        .content_type
        .clone()
        .unwrap_or_else(|| content_type_for(&key).to_string());

    let bucket = resolve(&state, requested_bucket.as_deref())?;
    let size = file.data.len() as u64;
    let custom_metadata = UploadMetadata::new(size, bucket.name.clone())
        .with_extra(extra)
        .into_custom_metadata();

    bucket
        .backend
        .put(
            &key,
            file.data,
            PutOptions {
                content_type: Some(content_type.clone()),
                custom_metadata,
            },
        )
        .await
        .map_err(|err| AppError::backend("Upload", err))?;

    info!(bucket = %bucket.name, key = %key, size, "uploaded file");

    Ok(Json(UploadResponse {
        success: true,
        url: format!("/files/{key}"),
        file_name: key,
        size,
        content_type,
        bucket: bucket.name,
        is_from_folder_upload,
    }))
}

/// GET `/files/{*key}`: stream an object back with its metadata as headers.
pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<BucketQuery>,
) -> Result<Response, AppError> {
    if key.is_empty() {
        return Err(AppError::bad_request("File name is required"));
    }
    let bucket = resolve(&state, q.bucket.as_deref())?;
    let object = bucket
        .backend
        .get(&key)
        .await
        .map_err(|err| AppError::backend("Download", err))?
        .ok_or_else(|| AppError::not_found("File not found"))?;

    debug!(bucket = %bucket.name, key = %key, size = object.meta.size, "serving file");

    let mut response = Response::new(Body::from_stream(object.body));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &object.meta);
    Ok(response)
}

/// DELETE `/files/{*key}`: unconditional, idempotent delete.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<BucketQuery>,
) -> Result<Json<DeleteResponse>, AppError> {
    if key.is_empty() {
        return Err(AppError::bad_request("File name is required"));
    }
    let bucket = resolve(&state, q.bucket.as_deref())?;
    bucket
        .backend
        .delete(&key)
        .await
        .map_err(|err| AppError::backend("Delete", err))?;

    info!(bucket = %bucket.name, key = %key, "deleted file");

    Ok(Json(DeleteResponse {
        success: true,
        file_name: key,
        bucket: bucket.name,
        message: "File deleted successfully".into(),
    }))
}

/// GET `/list`: one page of a prefix, folders first.
pub async fn list_files(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    let prefix = q.prefix.unwrap_or_default();
    let delimiter = q
        .delimiter
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "/".into());
    let limit = q
        .limit
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let bucket = resolve(&state, q.bucket.as_deref())?;
    let opts = ListOptions {
        prefix: prefix.clone(),
        delimiter: Some(delimiter),
        limit,
        cursor: q.cursor.filter(|c| !c.is_empty()),
    };
    let page = bucket
        .backend
        .list(&opts)
        .await
        .map_err(|err| AppError::backend("List", err))?;

    let mut files: Vec<FileEntry> = page
        .objects
        .into_iter()
        .map(|meta| object_entry(meta, &bucket.name))
        .chain(
            page.common_prefixes
                .into_iter()
                .map(|p| FileEntry::folder(p, bucket.name.clone())),
        )
        .collect();
    sort_entries(&mut files);

    Ok(Json(ListResponse {
        files,
        current_prefix: prefix,
        bucket: bucket.name,
        truncated: page.truncated,
        cursor: page.cursor,
    }))
}

/// GET `/buckets`: every registered bucket and the default.
pub async fn list_buckets(
    State(state): State<AppState>,
) -> Result<Json<BucketsResponse>, AppError> {
    if state.buckets.is_empty() {
        return Err(AppError::not_found("No buckets available"));
    }
    Ok(Json(BucketsResponse {
        success: true,
        buckets: state.buckets.names(),
        default: state.buckets.default_name().map(str::to_string),
    }))
}

/// Fallback for unmatched routes.
pub async fn not_found() -> AppError {
    AppError::not_found("Not found")
}

fn resolve(state: &AppState, requested: Option<&str>) -> Result<ResolvedBucket, AppError> {
    state
        .buckets
        .resolve(requested)
        .ok_or_else(AppError::no_buckets)
}

fn too_large(max: u64) -> AppError {
    AppError::payload_too_large(format!(
        "File too large (max {}MB)",
        max / (1024 * 1024)
    ))
}

fn form_error(err: MultipartError, max: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max)
    } else {
        AppError::bad_request(format!("Failed to parse form data: {}", err.body_text()))
    }
}

fn object_entry(meta: ObjectMeta, bucket: &str) -> FileEntry {
    FileEntry {
        is_folder: meta.key.ends_with('/'),
        name: meta.key,
        size: meta.size,
        uploaded: Some(meta.uploaded),
        etag: Some(meta.etag),
        bucket: bucket.to_string(),
        content_type: meta.content_type,
        custom_metadata: Some(meta.custom_metadata),
    }
}

/// Folders before files, then ascending by name.
fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| b.is_folder.cmp(&a.is_folder).then_with(|| a.name.cmp(&b.name)));
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMeta) {
    let content_type = meta.content_type.as_deref().unwrap_or(OCTET_STREAM);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));

    let disposition = format!(
        "inline; filename=\"{}\"",
        meta.base_name().replace('"', "_")
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).unwrap_or_else(|_| HeaderValue::from_static("inline")),
    );

    if let Ok(value) = HeaderValue::from_str(&meta.http_etag()) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&meta.uploaded.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));

    for (key, value) in &meta.custom_metadata {
        let name = HeaderName::try_from(format!("x-metadata-{key}"));
        match (name, HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => debug!(key = %key, "skipping metadata entry that is not header-safe"),
        }
    }
}
