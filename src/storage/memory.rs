use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{guess_content_type, BlobStore, ObjectMetadata, PutObject};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    metadata: ObjectMetadata,
}

/// Operation counters, shared between clones
#[derive(Debug, Default)]
pub struct StoreCalls {
    pub heads: AtomicUsize,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    pub presigns: AtomicUsize,
}

/// In-memory blob store
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    calls: Arc<StoreCalls>,
    fail_writes: Arc<RwLock<bool>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a `put` call
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>, content_type: Option<&str>) {
        let body = body.into();
        let metadata = ObjectMetadata {
            content_type: content_type.map(str::to_string),
            content_length: body.len() as u64,
            ..Default::default()
        };
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, metadata });
    }

    /// Seed an object together with metadata tags
    pub fn insert_with_tags(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
        content_type: &str,
        tags: &[(&str, &str)],
    ) {
        self.insert(bucket, key, body, Some(content_type));
        if let Some(object) = self.objects.write().get_mut(&(bucket.to_string(), key.to_string())) {
            for (name, value) in tags {
                object.metadata.tags.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Make every subsequent `put` fail
    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.write() = fail;
    }

    pub fn calls(&self) -> &StoreCalls {
        &self.calls
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects.read().contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Body as UTF-8 text, for assertions
    pub fn text(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| String::from_utf8_lossy(&o.body).into_owned())
    }

    pub fn metadata(&self, bucket: &str, key: &str) -> Option<ObjectMetadata> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.metadata.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        self.calls.heads.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.read();
        let object = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| anyhow!("Object not found: {}/{}", bucket, key))?;

        let mut metadata = object.metadata.clone();
        if metadata.content_type.is_none() {
            metadata.content_type = guess_content_type(key).map(str::to_string);
        }
        Ok(metadata)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| anyhow!("Object not found: {}/{}", bucket, key))
    }

    async fn put(&self, object: PutObject) -> Result<()> {
        self.calls.puts.fetch_add(1, Ordering::SeqCst);
        if *self.fail_writes.read() {
            return Err(anyhow!("Simulated write failure for {}/{}", object.bucket, object.key));
        }

        let metadata = ObjectMetadata {
            content_type: Some(object.content_type),
            content_length: object.body.len() as u64,
            tags: object.tags,
            last_modified: Some(chrono::Utc::now().to_rfc3339()),
        };
        self.objects.write().insert(
            (object.bucket, object.key),
            StoredObject {
                body: object.body,
                metadata,
            },
        );
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        self.calls.presigns.fetch_add(1, Ordering::SeqCst);
        if !self.contains(bucket, key) {
            return Err(anyhow!("Object not found: {}/{}", bucket, key));
        }
        Ok(format!("memory://{}/{}?expires_in={}", bucket, key, expires_in.as_secs()))
    }
}
