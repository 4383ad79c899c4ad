/*!
 * Filesystem-backed blob store.
 *
 * Objects live at `<root>/<bucket>/<key>`; their metadata is kept next to
 * them in `<key>.meta.json`. Retrieval links are `file://` URLs carrying an
 * expiry and a SHA-256 signature over bucket, key and expiry.
 */

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use url::Url;

use super::{guess_content_type, BlobStore, ObjectMetadata, PutObject};

const METADATA_SUFFIX: &str = ".meta.json";

/// Blob store rooted in a local directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    signing_secret: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, signing_secret: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            signing_secret: signing_secret.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object path, refusing keys that would escape the bucket
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains('/') || bucket.contains('\\') {
            return Err(anyhow!("Invalid bucket name: {:?}", bucket));
        }

        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(anyhow!("Invalid object key: {:?}", key));
        }

        Ok(self.root.join(bucket).join(relative))
    }

    fn metadata_path(object_path: &Path) -> PathBuf {
        let mut name = object_path.as_os_str().to_owned();
        name.push(METADATA_SUFFIX);
        PathBuf::from(name)
    }

    fn signature(&self, bucket: &str, key: &str, expires_at: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(bucket.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires_at.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check a link's signature and expiry against `now` (unix seconds)
    pub fn verify_link(&self, bucket: &str, key: &str, link: &str, now: i64) -> Result<()> {
        let url = Url::parse(link).context("Malformed retrieval link")?;

        let mut expires = None;
        let mut signature = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        let expires = expires.ok_or_else(|| anyhow!("Retrieval link has no expiry"))?;
        let signature = signature.ok_or_else(|| anyhow!("Retrieval link has no signature"))?;

        if signature != self.signature(bucket, key, expires) {
            return Err(anyhow!("Retrieval link signature mismatch"));
        }
        if now > expires {
            return Err(anyhow!("Retrieval link expired at {}", expires));
        }

        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let path = self.object_path(bucket, key)?;
        let file_meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Object not found: {}/{}", bucket, key))?;

        let sidecar = Self::metadata_path(&path);
        let mut metadata = match tokio::fs::read(&sidecar).await {
            Ok(raw) => serde_json::from_slice::<ObjectMetadata>(&raw)
                .with_context(|| format!("Corrupt metadata for {}/{}", bucket, key))?,
            Err(_) => ObjectMetadata::default(),
        };

        metadata.content_length = file_meta.len();
        if metadata.content_type.is_none() {
            metadata.content_type = guess_content_type(key).map(str::to_string);
        }

        Ok(metadata)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let path = self.object_path(bucket, key)?;
        let body = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read object {}/{}", bucket, key))?;
        Ok(Bytes::from(body))
    }

    async fn put(&self, object: PutObject) -> Result<()> {
        let path = self.object_path(&object.bucket, &object.key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        tokio::fs::write(&path, &object.body)
            .await
            .with_context(|| format!("Failed to write object {}/{}", object.bucket, object.key))?;

        let metadata = ObjectMetadata {
            content_type: Some(object.content_type.clone()),
            content_length: object.body.len() as u64,
            tags: object.tags.clone(),
            last_modified: Some(chrono::Utc::now().to_rfc3339()),
        };
        let sidecar = serde_json::to_vec_pretty(&metadata)?;
        tokio::fs::write(Self::metadata_path(&path), sidecar)
            .await
            .with_context(|| format!("Failed to write metadata for {}/{}", object.bucket, object.key))?;

        debug!("Stored {}/{} ({} bytes)", object.bucket, object.key, object.body.len());
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let path = self.object_path(bucket, key)?;
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };

        let expires_at = chrono::Utc::now().timestamp() + expires_in.as_secs() as i64;
        let mut url = Url::from_file_path(&absolute)
            .map_err(|_| anyhow!("Cannot build a file URL for {:?}", absolute))?;
        url.query_pairs_mut()
            .append_pair("expires", &expires_at.to_string())
            .append_pair("signature", &self.signature(bucket, key, expires_at));

        Ok(url.to_string())
    }
}
