//! End-to-end tests: a real listener on an ephemeral port driven through
//! `GatewayClient`.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use upload_gateway::{
    AppState,
    client::{
        ClientError, GatewayClient, ListRequest, UploadRequest,
        batch::{collect_folder, upload_batch},
        commands::browse,
        view::BrowserState,
    },
    middleware::auth::AuthSettings,
    routes,
    services::{memory_backend::MemoryBackend, registry::BucketRegistry},
};

fn registry(names: &[&str]) -> BucketRegistry {
    let mut registry = BucketRegistry::new();
    for name in names {
        registry
            .register(*name, Arc::new(MemoryBackend::new()))
            .unwrap();
    }
    registry
}

async fn spawn(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes(state)).await.unwrap();
    });
    format!("http://{addr}/")
}

fn api_status<T: std::fmt::Debug>(result: Result<T, ClientError>) -> u16 {
    match result {
        Err(ClientError::Api { status, .. }) => status,
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_list_download_delete() {
    let base = spawn(AppState::new(registry(&["files"]))).await;
    let client = GatewayClient::new(base, None).unwrap();

    let mut metadata = BTreeMap::new();
    metadata.insert("author".to_string(), "ada".to_string());
    let uploaded = client
        .upload(UploadRequest {
            data: "# notes".into(),
            file_name: "readme.md".into(),
            key: Some("docs/readme.md".into()),
            content_type: Some("text/markdown".into()),
            metadata,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(uploaded.file_name, "docs/readme.md");
    assert_eq!(uploaded.bucket, "files");
    assert!(uploaded.is_from_folder_upload);

    let root = client.list(&ListRequest::default()).await.unwrap();
    assert_eq!(root.files.len(), 1);
    assert!(root.files[0].is_folder);
    assert_eq!(root.files[0].name, "docs/");

    let docs = client
        .list(&ListRequest {
            prefix: "docs/".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(docs.current_prefix, "docs/");
    assert_eq!(docs.files[0].name, "docs/readme.md");
    assert_eq!(docs.files[0].size, 7);

    let download = client.download("docs/readme.md", None).await.unwrap();
    assert_eq!(&download.data[..], b"# notes");
    assert_eq!(download.content_type.as_deref(), Some("text/markdown"));
    assert_eq!(download.metadata["author"], "ada");
    assert_eq!(download.metadata["filesize"], "7");

    let deleted = client.delete("docs/readme.md", None).await.unwrap();
    assert!(deleted.success);
    assert_eq!(api_status(client.download("docs/readme.md", None).await), 404);

    // deleting again still succeeds
    assert!(client.delete("docs/readme.md", None).await.unwrap().success);
}

#[tokio::test]
async fn keys_with_reserved_url_characters_round_trip() {
    let base = spawn(AppState::new(registry(&["files"]))).await;
    let client = GatewayClient::new(base, None).unwrap();

    let key = "my docs/50% off #1?.txt";
    let uploaded = client
        .upload(UploadRequest {
            data: "sale".into(),
            file_name: "x.txt".into(),
            key: Some(key.into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let stored = uploaded.file_name;
    assert!(stored.starts_with("my docs/"));
    let download = client.download(&stored, None).await.unwrap();
    assert_eq!(&download.data[..], b"sale");
}

#[tokio::test]
async fn recursive_browse_visits_every_folder_depth_first() {
    let base = spawn(AppState::new(registry(&["files"]))).await;
    let client = GatewayClient::new(base, None).unwrap();
    for key in ["a/b/c.txt", "a/d.txt", "top.txt", "z/e.txt"] {
        client
            .upload(UploadRequest {
                data: "x".into(),
                file_name: key.rsplit('/').next().unwrap().into(),
                key: Some(key.into()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let listed = browse(&client, BrowserState::new(None), None, None, true)
        .await
        .unwrap();
    let prefixes: Vec<_> = listed.iter().map(|(state, _)| state.prefix()).collect();
    assert_eq!(prefixes, ["", "a/", "a/b/", "z/"]);
    assert!(listed[0].0.is_root());
    assert_eq!(listed[2].1.files[0].name, "a/b/c.txt");

    let flat = browse(&client, BrowserState::new(None), None, None, false)
        .await
        .unwrap();
    assert_eq!(flat.len(), 1);
}

#[tokio::test]
async fn buckets_and_bucket_selection() {
    let base = spawn(AppState::new(registry(&["files", "archive"]))).await;
    let client = GatewayClient::new(base, None).unwrap();

    let buckets = client.buckets().await.unwrap();
    assert_eq!(buckets.buckets, vec!["files", "archive"]);
    assert_eq!(buckets.default.as_deref(), Some("files"));

    client
        .upload(UploadRequest {
            data: "old".into(),
            file_name: "2019.log".into(),
            bucket: Some("archive".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let archive = client
        .list(&ListRequest {
            bucket: Some("archive".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(archive.bucket, "archive");
    assert_eq!(archive.files.len(), 1);

    assert_eq!(api_status(client.download("2019.log", None).await), 404);
    assert!(client.download("2019.log", Some("archive")).await.is_ok());
}

#[tokio::test]
async fn token_is_sent_as_bearer() {
    let state = AppState::new(registry(&["files"]))
        .with_auth(AuthSettings::new(Some("s3cret".into())));
    let base = spawn(state).await;

    let anonymous = GatewayClient::new(base.clone(), None).unwrap();
    assert_eq!(api_status(anonymous.buckets().await), 401);

    let wrong = GatewayClient::new(base.clone(), Some("guess".into())).unwrap();
    assert_eq!(api_status(wrong.buckets().await), 401);

    let authed = GatewayClient::new(base, Some("s3cret".into())).unwrap();
    assert!(authed.buckets().await.unwrap().success);
}

#[tokio::test]
async fn progress_ends_at_the_full_size() {
    let base = spawn(AppState::new(registry(&["files"]))).await;
    let client = GatewayClient::new(base, None).unwrap();

    let data = vec![7u8; 300 * 1024];
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let uploaded = client
        .upload_with_progress(
            UploadRequest {
                data: data.clone().into(),
                file_name: "blob.bin".into(),
                ..Default::default()
            },
            move |snapshot| sink.lock().unwrap().push(snapshot),
        )
        .await
        .unwrap();
    assert_eq!(uploaded.size, data.len() as u64);

    let seen = seen.lock().unwrap();
    let last = seen.last().expect("at least one progress report");
    assert_eq!(last.sent, data.len() as u64);
    assert_eq!(last.total, data.len() as u64);
    assert!((last.percent - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn folder_batch_records_failures_and_carries_on() {
    let state = AppState::new(registry(&["files"])).with_max_upload_bytes(1024);
    let base = spawn(state).await;
    let client = GatewayClient::new(base, None).unwrap();

    let dir = TempDir::new().unwrap();
    let album = dir.path().join("album");
    std::fs::create_dir_all(album.join("inner")).unwrap();
    std::fs::write(album.join("a.txt"), b"first").unwrap();
    std::fs::write(album.join("inner/b.txt"), b"second").unwrap();
    std::fs::write(album.join("z-big.bin"), vec![0u8; 8 * 1024]).unwrap();

    let files = collect_folder(&album).await.unwrap();
    let mut ticks = Vec::new();
    let report = upload_batch(&client, files, None, |p| ticks.push((p.done, p.uploaded))).await;

    assert!(!report.success);
    assert_eq!(report.total, 3);
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].name, "z-big.bin");
    assert_eq!(ticks, vec![(1, 1), (2, 2), (3, 2)]);

    let listed = client
        .list(&ListRequest {
            prefix: "album/".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let names: Vec<_> = listed.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["album/inner/", "album/a.txt"]);
}
