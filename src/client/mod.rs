//! A `reqwest` client for the gateway's HTTP API.
//!
//! Besides the plain calls this module carries what a browser frontend does
//! on top of them: sequential folder uploads (`batch`), folder navigation
//! state (`view`) and progress reporting (`format`).

pub mod batch;
pub mod commands;
pub mod format;
pub mod view;

use crate::models::api::{
    BucketsResponse, DeleteResponse, ErrorBody, ListResponse, UploadResponse,
};
use bytes::Bytes;
use format::{ProgressSnapshot, ProgressTracker};
use futures::{StreamExt, stream};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{
    Method, RequestBuilder, Response,
    multipart::{Form, Part},
};
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, io, time::Instant};
use thiserror::Error;

/// Characters escaped when a key is placed in the URL path; `/` stays.
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const UPLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// One file to send to `POST /upload`.
#[derive(Clone, Debug, Default)]
pub struct UploadRequest {
    pub data: Bytes,
    /// The payload's own file name.
    pub file_name: String,
    /// Explicit key (`fileName` form field); may contain `/`.
    pub key: Option<String>,
    pub bucket: Option<String>,
    pub content_type: Option<String>,
    /// Extra form fields, stored as custom metadata.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub bucket: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// A downloaded object.
#[derive(Debug)]
pub struct Download {
    pub data: Bytes,
    pub content_type: Option<String>,
    /// `X-Metadata-*` headers with the prefix stripped.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub async fn upload(&self, req: UploadRequest) -> ClientResult<UploadResponse> {
        self.upload_with_progress(req, |_| {}).await
    }

    /// Upload one file, calling `on_progress` at most every 200ms and once
    /// more when the last byte has been handed to the connection.
    pub async fn upload_with_progress<F>(
        &self,
        req: UploadRequest,
        mut on_progress: F,
    ) -> ClientResult<UploadResponse>
    where
        F: FnMut(ProgressSnapshot) + Send + Sync + 'static,
    {
        let total = req.data.len() as u64;
        let mut tracker = ProgressTracker::new(total, Instant::now());
        let chunks: Vec<Bytes> = (0..req.data.len())
            .step_by(UPLOAD_CHUNK)
            .map(|start| req.data.slice(start..(start + UPLOAD_CHUNK).min(req.data.len())))
            .collect();

        let mut sent = 0u64;
        let body = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(snapshot) = tracker.record(sent, Instant::now()) {
                on_progress(snapshot);
            }
            Ok::<_, io::Error>(chunk)
        });

        let mut part = Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(req.file_name.clone());
        if let Some(ct) = req.content_type.as_deref() {
            part = part.mime_str(ct)?;
        }

        let mut form = Form::new().part("file", part);
        if let Some(key) = req.key {
            form = form.text("fileName", key);
        }
        if let Some(bucket) = req.bucket {
            form = form.text("bucket", bucket);
        }
        for (name, value) in req.metadata {
            form = form.text(name, value);
        }

        let response = self
            .request(Method::POST, "/upload")
            .multipart(form)
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn list(&self, req: &ListRequest) -> ClientResult<ListResponse> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(bucket) = &req.bucket {
            query.push(("bucket", bucket.clone()));
        }
        if !req.prefix.is_empty() {
            query.push(("prefix", req.prefix.clone()));
        }
        if let Some(limit) = req.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = &req.cursor {
            query.push(("cursor", cursor.clone()));
        }

        let response = self
            .request(Method::GET, "/list")
            .query(&query)
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn download(&self, key: &str, bucket: Option<&str>) -> ClientResult<Download> {
        let response = self
            .request(Method::GET, &file_path(key))
            .query(&bucket_query(bucket))
            .send()
            .await?;
        let response = check_status(response).await?;

        let headers = response.headers();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let metadata = headers
            .iter()
            .filter_map(|(name, value)| {
                let key = name.as_str().strip_prefix("x-metadata-")?;
                Some((key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();

        Ok(Download {
            data: response.bytes().await?,
            content_type,
            metadata,
        })
    }

    pub async fn delete(&self, key: &str, bucket: Option<&str>) -> ClientResult<DeleteResponse> {
        let response = self
            .request(Method::DELETE, &file_path(key))
            .query(&bucket_query(bucket))
            .send()
            .await?;
        parse_json(response).await
    }

    pub async fn buckets(&self) -> ClientResult<BucketsResponse> {
        let response = self.request(Method::GET, "/buckets").send().await?;
        parse_json(response).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn file_path(key: &str) -> String {
    format!("/files/{}", utf8_percent_encode(key, KEY_ENCODE_SET))
}

fn bucket_query(bucket: Option<&str>) -> Vec<(&'static str, String)> {
    bucket
        .map(|b| vec![("bucket", b.to_string())])
        .unwrap_or_default()
}

/// Turn a non-2xx answer into `ClientError::Api`, using the JSON `error`
/// field when the body has one.
async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("Server responded with {}", status.as_u16()));
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let response = check_status(response).await?;
    Ok(response.json::<T>().await?)
}
