//! Blob storage for trace snapshots.
//!
//! Keys are plain `/`-separated strings. A `put` replaces the whole object;
//! no transactional guarantees exist across several puts.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::config::BlobConfig;
use crate::error::ForgeError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ForgeError>;

    /// Read the object under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, ForgeError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Build the backend selected by `[blob] backend`.
pub async fn create_blob_store(config: &BlobConfig) -> Result<Box<dyn BlobStore>, ForgeError> {
    match config.backend.as_str() {
        "fs" => {
            let root = config
                .root
                .clone()
                .ok_or_else(|| ForgeError::Blob("blob.root is required for fs backend".into()))?;
            Ok(Box::new(FsBlobStore::new(root)))
        }
        "s3" => Ok(Box::new(S3BlobStore::from_config(config).await?)),
        "memory" => Ok(Box::new(InMemoryBlobStore::new())),
        other => Err(ForgeError::Blob(format!("unknown blob backend '{}'", other))),
    }
}

// ============================================================================
// FsBlobStore
// ============================================================================

/// Stores objects as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ForgeError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ForgeError::Blob(format!("invalid blob key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> Result<(), ForgeError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so readers never observe a half-written object.
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(key, bytes = data.len(), "Blob written to filesystem");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ForgeError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "fs"
    }
}

// ============================================================================
// S3BlobStore
// ============================================================================

/// S3 or S3-compatible (MinIO, R2) object storage.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    pub async fn from_config(config: &BlobConfig) -> Result<Self, ForgeError> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| ForgeError::Blob("blob.bucket is required for s3 backend".into()))?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        Ok(Self::new(
            Client::from_conf(s3_config),
            bucket,
            config.prefix.clone(),
        ))
    }

    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ForgeError> {
        let object_key = self.object_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ForgeError::Blob(format!("Failed to upload {}: {}", object_key, e)))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ForgeError> {
        let object_key = self.object_key(key);
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(ForgeError::Blob(format!(
                    "Failed to download {}: {}",
                    object_key, service_error
                )));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| ForgeError::Blob(format!("Failed to read {}: {}", object_key, e)))?;
        Ok(Some(data.into_bytes()))
    }

    fn name(&self) -> &str {
        "s3"
    }
}

// ============================================================================
// InMemoryBlobStore
// ============================================================================

/// Keeps objects in a map. Data is lost when dropped.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, (Bytes, String)>>,
    puts: AtomicUsize,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls served so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), ForgeError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects
            .write()
            .await
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, ForgeError> {
        Ok(self.objects.read().await.get(key).map(|(data, _)| data.clone()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_put_then_get_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());

        store
            .put("traces/1/2024-01-01/2/t/trace.json", Bytes::from_static(b"one"), "application/json")
            .await
            .unwrap();
        store
            .put("traces/1/2024-01-01/2/t/trace.json", Bytes::from_static(b"two"), "application/json")
            .await
            .unwrap();

        let data = store.get("traces/1/2024-01-01/2/t/trace.json").await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"two"[..]));

        // No temp files left behind next to the object.
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("traces/1/2024-01-01/2/t"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_fs_get_missing_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        assert!(store.get("nope/trace.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_rejects_escaping_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let result = store
            .put("../outside.json", Bytes::from_static(b"x"), "application/json")
            .await;
        assert!(matches!(result, Err(ForgeError::Blob(_))));
        assert!(store.get("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_tracks_puts() {
        let store = InMemoryBlobStore::new();
        store
            .put("a/b.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.keys().await, vec!["a/b.json".to_string()]);
        assert_eq!(
            store.content_type("a/b.json").await.as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_factory_selects_backend() {
        let mut config = BlobConfig {
            backend: "memory".to_string(),
            ..BlobConfig::default()
        };
        assert_eq!(create_blob_store(&config).await.unwrap().name(), "memory");

        config.backend = "fs".to_string();
        assert_eq!(create_blob_store(&config).await.unwrap().name(), "fs");

        config.backend = "gcs".to_string();
        assert!(create_blob_store(&config).await.is_err());

        config.backend = "s3".to_string();
        config.bucket = None;
        assert!(create_blob_store(&config).await.is_err());
    }
}
