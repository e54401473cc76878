//! FsBackend: one bucket stored on local disk with its metadata in SQLite.
//! Payloads live beneath `base_path/{bucket}/{shard}/{shard}/{blob-id}`; every
//! write lands in a fresh blob file and the metadata row is swapped in a
//! single transaction, so readers only ever see complete payloads and the
//! last committed writer wins.

use crate::{
    models::{
        listing::{ListOptions, ListPage, Paginator, Step},
        object::{ObjectBody, ObjectMeta, PutOptions},
    },
    services::storage_backend::{
        StorageBackend, StorageError, StorageResult, compute_etag, ensure_key_valid,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

/// Open (creating if needed) the SQLite database shared by every on-disk
/// bucket and apply the embedded migrations.
pub async fn open_metadata_pool(database_url: &str) -> StorageResult<Arc<SqlitePool>> {
    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
            debug!("created metadata directory {}", parent.display());
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(Arc::new(pool))
}

#[derive(Debug, FromRow)]
struct ObjectRow {
    key: String,
    blob_id: String,
    size_bytes: i64,
    etag: String,
    content_type: Option<String>,
    custom_metadata: String,
    uploaded_at: DateTime<Utc>,
}

impl ObjectRow {
    fn into_meta(self) -> StorageResult<(ObjectMeta, String)> {
        let custom_metadata: BTreeMap<String, String> =
            serde_json::from_str(&self.custom_metadata).map_err(|source| {
                StorageError::Metadata {
                    key: self.key.clone(),
                    source,
                }
            })?;
        let meta = ObjectMeta {
            key: self.key,
            size: self.size_bytes.max(0) as u64,
            uploaded: self.uploaded_at,
            etag: self.etag,
            content_type: self.content_type,
            custom_metadata,
        };
        Ok((meta, self.blob_id))
    }
}

const MAX_OPEN_ATTEMPTS: usize = 4;

const OBJECT_COLUMNS: &str =
    "key, blob_id, size_bytes, etag, content_type, custom_metadata, uploaded_at";

/// A single bucket on local disk.
///
/// Several `FsBackend`s usually share one pool; rows are scoped by bucket.
#[derive(Clone)]
pub struct FsBackend {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads of all buckets are stored.
    pub base_path: PathBuf,

    bucket: String,
}

impl FsBackend {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            bucket: bucket.into(),
        }
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard identifiers derived from MD5(bucket/key), so every
    /// version of one key lands in the same directory.
    fn object_shards(&self, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", self.bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &str, blob_id: &str) -> PathBuf {
        let (shard_a, shard_b) = self.object_shards(key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(blob_id);
        path
    }

    async fn write_blob(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "blob path missing parent directory"))?;
        fs::create_dir_all(parent).await?;

        let mut file = File::create(path).await?;
        let written = async {
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(path).await;
            return Err(err);
        }
        Ok(())
    }

    /// Remove a superseded or deleted blob, then prune empty shard folders.
    async fn remove_blob(&self, key: &str, blob_id: &str) {
        let path = self.blob_path(key, blob_id);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed blob {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", path.display());
            }
            Err(err) => {
                debug!("failed to remove blob {}: {}", path.display(), err);
                return;
            }
        }
        if let Some(parent) = path.parent() {
            prune_empty_dirs(parent, &self.bucket_root()).await;
        }
    }

    async fn fetch_row(&self, key: &str) -> StorageResult<Option<ObjectRow>> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket = ? AND key = ?");
        let row = sqlx::query_as::<_, ObjectRow>(&sql)
            .bind(&self.bucket)
            .bind(key)
            .fetch_optional(&*self.db)
            .await?;
        Ok(row)
    }

    /// Open the blob `row` points at.
    ///
    /// An overwrite committed after the row was read removes that blob, so on
    /// `NotFound` the row is read again and the newer blob opened. `None`
    /// only when the row itself is gone.
    async fn open_current(
        &self,
        key: &str,
        mut row: ObjectRow,
    ) -> StorageResult<Option<ObjectBody>> {
        let mut attempt = 1;
        loop {
            match File::open(self.blob_path(key, &row.blob_id)).await {
                Ok(file) => {
                    let (meta, _) = row.into_meta()?;
                    return Ok(Some(ObjectBody {
                        meta,
                        body: ReaderStream::new(file).boxed(),
                    }));
                }
                Err(err) if err.kind() == ErrorKind::NotFound && attempt < MAX_OPEN_ATTEMPTS => {
                    match self.fetch_row(key).await? {
                        None => return Ok(None),
                        // The row still names the missing blob: the payload is lost.
                        Some(next) if next.blob_id == row.blob_id => {
                            return Err(StorageError::Io(err));
                        }
                        Some(next) => {
                            debug!(bucket = %self.bucket, key, "blob replaced during read, retrying");
                            row = next;
                        }
                    }
                    attempt += 1;
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
    }
}

/// Exclusive upper bound for keys starting with `prefix`: the prefix followed
/// by `char::MAX`, which keys may not contain. `None` for the empty prefix.
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    (!prefix.is_empty()).then(|| format!("{prefix}{}", char::MAX))
}

#[async_trait]
impl StorageBackend for FsBackend {
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<ObjectMeta> {
        ensure_key_valid(key)?;

        let blob_id = Uuid::new_v4().to_string();
        let blob_path = self.blob_path(key, &blob_id);
        self.write_blob(&blob_path, &data).await?;

        let meta = ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            uploaded: Utc::now(),
            etag: compute_etag(&data),
            content_type: opts.content_type,
            custom_metadata: opts.custom_metadata,
        };
        let custom = serde_json::to_string(&meta.custom_metadata).map_err(|source| {
            StorageError::Metadata {
                key: key.to_string(),
                source,
            }
        })?;

        let swapped = async {
            let mut tx = self.db.begin().await?;
            let previous = sqlx::query_scalar::<_, String>(
                "DELETE FROM objects WHERE bucket = ? AND key = ? RETURNING blob_id",
            )
            .bind(&self.bucket)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;
            sqlx::query(
                r#"
                INSERT INTO objects (
                    bucket, key, blob_id, size_bytes, etag, content_type,
                    custom_metadata, uploaded_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.bucket)
            .bind(key)
            .bind(&blob_id)
            .bind(meta.size as i64)
            .bind(&meta.etag)
            .bind(meta.content_type.as_deref())
            .bind(&custom)
            .bind(meta.uploaded)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(previous)
        }
        .await;

        match swapped {
            Ok(previous) => {
                if let Some(old) = previous {
                    self.remove_blob(key, &old).await;
                }
                debug!(bucket = %self.bucket, key, size = meta.size, "stored object");
                Ok(meta)
            }
            Err(err) => {
                self.remove_blob(key, &blob_id).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    async fn get(&self, key: &str) -> StorageResult<Option<ObjectBody>> {
        let Some(row) = self.fetch_row(key).await? else {
            return Ok(None);
        };
        self.open_current(key, row).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let removed = sqlx::query_scalar::<_, String>(
            "DELETE FROM objects WHERE bucket = ? AND key = ? RETURNING blob_id",
        )
        .bind(&self.bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;

        if let Some(blob_id) = removed {
            self.remove_blob(key, &blob_id).await;
        }
        Ok(())
    }

    async fn list(&self, opts: &ListOptions) -> StorageResult<ListPage> {
        let start_after = opts
            .start_after()
            .filter(|after| after.as_str() >= opts.prefix.as_str());
        let upper = prefix_upper_bound(&opts.prefix);

        let mut sql = format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket = ? AND key >= ?");
        if upper.is_some() {
            sql.push_str(" AND key < ?");
        }
        if start_after.is_some() {
            sql.push_str(" AND key > ?");
        }
        sql.push_str(" ORDER BY key ASC");

        let mut query = sqlx::query_as::<_, ObjectRow>(&sql)
            .bind(&self.bucket)
            .bind(&opts.prefix);
        if let Some(upper) = &upper {
            query = query.bind(upper);
        }
        if let Some(after) = &start_after {
            query = query.bind(after);
        }

        // Rows stream in key order; only those that land on the page as
        // objects get their metadata decoded.
        let mut rows = query.fetch(&*self.db);
        let mut pager = Paginator::new(opts);
        while let Some(row) = rows.try_next().await? {
            match pager.offer(&row.key) {
                Step::Object => pager.push_object(row.into_meta()?.0),
                Step::Grouped => {}
                Step::Full => break,
            }
        }
        Ok(pager.finish())
    }

    /// 1. `SELECT 1` against SQLite.
    /// 2. A write/read/delete round trip under the bucket directory.
    async fn check(&self) -> StorageResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StorageError::Unavailable(format!(
                "unexpected result from SELECT 1: {one}"
            )));
        }

        let root = self.bucket_root();
        fs::create_dir_all(&root).await?;
        let scratch = root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&scratch, b"readyz").await?;
        let read_back = fs::read(&scratch).await;
        let _ = fs::remove_file(&scratch).await;
        if read_back? != b"readyz" {
            return Err(StorageError::Unavailable("disk check content mismatch".into()));
        }
        Ok(())
    }
}

/// Remove empty directories from `start` up to, but excluding, `stop`.
async fn prune_empty_dirs(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::remove_dir(&current).await {
            Ok(_) => match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            },
            Err(err) if err.kind() == ErrorKind::NotFound => break,
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
            Err(err) => {
                debug!("failed to prune directory {}: {}", current.display(), err);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn backend(bucket: &str) -> (FsBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}", dir.path().join("meta/gateway.db").display());
        let pool = open_metadata_pool(&db_url).await.unwrap();
        (FsBackend::new(pool, dir.path().join("objects"), bucket), dir)
    }

    async fn read_all(body: ObjectBody) -> Vec<u8> {
        let chunks: Vec<Bytes> = body.body.try_collect().await.unwrap();
        chunks.concat()
    }

    fn blob_count(root: &Path) -> usize {
        fn walk(dir: &Path, count: &mut usize) {
            let Ok(entries) = std::fs::read_dir(dir) else { return };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, count);
                } else {
                    *count += 1;
                }
            }
        }
        let mut count = 0;
        walk(root, &mut count);
        count
    }

    #[tokio::test]
    async fn round_trips_bytes_and_metadata() {
        let (store, _dir) = backend("files").await;
        let mut custom = BTreeMap::new();
        custom.insert("author".to_string(), "ada".to_string());
        store
            .put(
                "docs/report.pdf",
                Bytes::from_static(b"%PDF-1.7"),
                PutOptions {
                    content_type: Some("application/pdf".into()),
                    custom_metadata: custom,
                },
            )
            .await
            .unwrap();

        let body = store.get("docs/report.pdf").await.unwrap().expect("present");
        assert_eq!(body.meta.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(body.meta.custom_metadata["author"], "ada");
        assert_eq!(body.meta.size, 8);
        assert_eq!(read_all(body).await, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn overwrite_replaces_the_blob() {
        let (store, dir) = backend("files").await;
        store
            .put("a.txt", Bytes::from_static(b"one"), PutOptions::default())
            .await
            .unwrap();
        store
            .put("a.txt", Bytes::from_static(b"second"), PutOptions::default())
            .await
            .unwrap();

        let body = store.get("a.txt").await.unwrap().expect("present");
        assert_eq!(read_all(body).await, b"second");
        assert_eq!(blob_count(&dir.path().join("objects/files")), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_prunes_shards() {
        let (store, dir) = backend("files").await;
        store
            .put("x/y.bin", Bytes::from_static(b"1"), PutOptions::default())
            .await
            .unwrap();
        store.delete("x/y.bin").await.unwrap();
        store.delete("x/y.bin").await.unwrap();

        assert!(store.get("x/y.bin").await.unwrap().is_none());
        let root = dir.path().join("objects/files");
        let leftovers = std::fs::read_dir(&root).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn buckets_sharing_a_pool_are_isolated() {
        let dir = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}", dir.path().join("gateway.db").display());
        let pool = open_metadata_pool(&db_url).await.unwrap();
        let photos = FsBackend::new(pool.clone(), dir.path(), "photos");
        let docs = FsBackend::new(pool, dir.path(), "docs");

        photos
            .put("cat.jpg", Bytes::from_static(b"meow"), PutOptions::default())
            .await
            .unwrap();
        assert!(docs.get("cat.jpg").await.unwrap().is_none());
        assert!(
            docs.list(&ListOptions::default())
                .await
                .unwrap()
                .objects
                .is_empty()
        );
    }

    #[tokio::test]
    async fn lists_immediate_children_with_folders() {
        let (store, _dir) = backend("files").await;
        for key in ["a/b/c.txt", "a/z.txt", "a/d.txt", "a_b.txt", "top.txt"] {
            store
                .put(key, Bytes::from_static(b"x"), PutOptions::default())
                .await
                .unwrap();
        }
        let page = store
            .list(&ListOptions {
                prefix: "a/".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(names, vec!["a/d.txt", "a/z.txt"]);
        assert_eq!(page.common_prefixes, vec!["a/b/"]);
    }

    #[tokio::test]
    async fn concurrent_writes_leave_one_complete_payload() {
        let (store, _dir) = backend("files").await;
        let first = Bytes::from(vec![b'a'; 256 * 1024]);
        let second = Bytes::from(vec![b'b'; 192 * 1024]);

        let (s1, s2) = (store.clone(), store.clone());
        let (p1, p2) = (first.clone(), second.clone());
        let t1 = tokio::spawn(async move { s1.put("same", p1, PutOptions::default()).await });
        let t2 = tokio::spawn(async move { s2.put("same", p2, PutOptions::default()).await });
        t1.await.unwrap().unwrap();
        t2.await.unwrap().unwrap();

        let body = store.get("same").await.unwrap().expect("present");
        let size = body.meta.size as usize;
        let data = read_all(body).await;
        assert!(data == first || data == second);
        assert_eq!(size, data.len());
    }

    #[tokio::test]
    async fn read_racing_an_overwrite_follows_the_new_row() {
        let (store, _dir) = backend("files").await;
        store
            .put("k", Bytes::from_static(b"v0"), PutOptions::default())
            .await
            .unwrap();

        let stale = store.fetch_row("k").await.unwrap().expect("row");
        let stale_path = store.blob_path("k", &stale.blob_id);
        store
            .put("k", Bytes::from_static(b"v1"), PutOptions::default())
            .await
            .unwrap();
        assert!(!stale_path.exists());

        let body = store.open_current("k", stale).await.unwrap().expect("key still exists");
        assert_eq!(read_all(body).await, b"v1");
    }

    #[tokio::test]
    async fn read_racing_a_delete_reports_absent() {
        let (store, _dir) = backend("files").await;
        store
            .put("k", Bytes::from_static(b"v0"), PutOptions::default())
            .await
            .unwrap();

        let stale = store.fetch_row("k").await.unwrap().expect("row");
        store.delete("k").await.unwrap();
        assert!(store.open_current("k", stale).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_does_not_decode_rows_past_its_end() {
        let (store, _dir) = backend("files").await;
        for key in ["a", "z"] {
            store
                .put(key, Bytes::from_static(b"x"), PutOptions::default())
                .await
                .unwrap();
        }
        sqlx::query("UPDATE objects SET custom_metadata = ? WHERE bucket = ? AND key = ?")
            .bind("{not json")
            .bind("files")
            .bind("z")
            .execute(&*store.db)
            .await
            .unwrap();

        let page = store
            .list(&ListOptions {
                limit: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(names, vec!["a"]);
        assert!(page.truncated);

        let next = ListOptions {
            limit: 1,
            cursor: page.cursor,
            ..Default::default()
        };
        assert!(matches!(
            store.list(&next).await,
            Err(StorageError::Metadata { .. })
        ));
    }

    #[tokio::test]
    async fn prefix_range_excludes_neighbouring_keys() {
        let (store, _dir) = backend("files").await;
        for key in ["a", "a/x", "a/y/z", "a0", "b"] {
            store
                .put(key, Bytes::from_static(b"x"), PutOptions::default())
                .await
                .unwrap();
        }
        let page = store
            .list(&ListOptions {
                prefix: "a/".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(names, vec!["a/x"]);
        assert_eq!(page.common_prefixes, vec!["a/y/"]);
        assert!(!page.truncated);
    }

    #[tokio::test]
    async fn readiness_check_passes_on_healthy_disk() {
        let (store, _dir) = backend("files").await;
        store.check().await.unwrap();
    }
}
