//! In-process backend: an ordered map behind an async lock.

use crate::{
    models::{
        listing::{ListOptions, ListPage, paginate},
        object::{ObjectBody, ObjectMeta, PutOptions},
    },
    services::storage_backend::{
        StorageBackend, StorageResult, compute_etag, ensure_key_valid,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::{collections::BTreeMap, ops::Bound, sync::Arc};
use tokio::sync::RwLock;

#[derive(Clone)]
struct StoredObject {
    meta: ObjectMeta,
    data: Bytes,
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> StorageResult<ObjectMeta> {
        ensure_key_valid(key)?;
        let meta = ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            uploaded: Utc::now(),
            etag: compute_etag(&data),
            content_type: opts.content_type,
            custom_metadata: opts.custom_metadata,
        };

        let mut objects = self.objects.write().await;
        objects.insert(
            key.to_string(),
            StoredObject {
                meta: meta.clone(),
                data,
            },
        );
        Ok(meta)
    }

    async fn get(&self, key: &str) -> StorageResult<Option<ObjectBody>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).cloned().map(|obj| {
            let data = obj.data;
            ObjectBody {
                meta: obj.meta,
                body: stream::once(async move { Ok(data) }).boxed(),
            }
        }))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, opts: &ListOptions) -> StorageResult<ListPage> {
        let objects = self.objects.read().await;
        let start_after = opts.start_after();
        let lower = match start_after.as_deref() {
            Some(after) if after >= opts.prefix.as_str() => Bound::Excluded(after),
            _ => Bound::Included(opts.prefix.as_str()),
        };

        let entries = objects
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(_, obj)| &obj.meta)
            .take_while(|meta| meta.key.starts_with(&opts.prefix))
            .cloned();

        Ok(paginate(entries, opts))
    }

    async fn check(&self) -> StorageResult<()> {
        Ok(())
    }
}
