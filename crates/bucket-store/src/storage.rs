//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).
//!
//! [`Bucket`] is the only capability the publisher needs from a store:
//! list every key, read one object, write one object with headers. Keys are
//! passed through byte for byte, so a bare package listing really lives at
//! `foo/`. Backends that cannot hold such a key say so through
//! [`Bucket::supports_directory_keys`].
//!
//! - [`S3Bucket`]: S3 and S3-compatible stores, via the AWS SDK
//! - [`ObjectStoreBucket`]: a local directory, via `object_store`
//! - [`MemoryBucket`]: process-local map, for tests and dry runs

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::s3::S3Bucket;

/// Access control applied to every written object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    #[default]
    PublicRead,
    Private,
}

impl Acl {
    pub fn from_private(private: bool) -> Self {
        if private {
            Acl::Private
        } else {
            Acl::PublicRead
        }
    }

    /// Canned ACL name as S3 spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::PublicRead => "public-read",
            Acl::Private => "private",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to an object on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeaders {
    pub content_type: String,
    pub cache_control: Option<String>,
    pub acl: Acl,
}

/// Configuration for the object storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory storage (for testing)
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the directory standing in for the bucket root
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    ///
    /// Anything left unset comes from the AWS default provider chain
    /// (`AWS_*` environment variables, shared config files, instance roles).
    S3 {
        /// Endpoint URL (e.g., "http://localhost:9000" for MinIO)
        #[serde(default)]
        endpoint: Option<String>,
        /// Access key ID
        #[serde(default)]
        access_key: Option<String>,
        /// Secret access key
        #[serde(default)]
        secret_key: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::S3 {
            endpoint: None,
            access_key: None,
            secret_key: None,
        }
    }
}

/// The narrow object-store capability the publisher is written against.
#[async_trait]
pub trait Bucket: Send + Sync + fmt::Debug {
    /// Bucket identifier, for logs and error messages
    fn name(&self) -> &str;

    /// Whether a key ending in `/` is stored as an object of its own.
    fn supports_directory_keys(&self) -> bool {
        true
    }

    /// Every object key currently in the bucket.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Read a whole object. A missing key is [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Write a whole object in one request, replacing any existing one.
    async fn put(&self, key: &str, body: Bytes, headers: &ObjectHeaders) -> Result<()>;
}

/// Open the bucket described by `config`.
pub async fn open_bucket(
    name: &str,
    region: Option<&str>,
    config: &BackendConfig,
) -> Result<Arc<dyn Bucket>> {
    let bucket: Arc<dyn Bucket> = match config {
        BackendConfig::Memory => Arc::new(MemoryBucket::new(name)),
        BackendConfig::Local { path } => Arc::new(ObjectStoreBucket::local(name, path).await?),
        BackendConfig::S3 {
            endpoint,
            access_key,
            secret_key,
        } => Arc::new(
            S3Bucket::new(
                name,
                region,
                endpoint.as_deref(),
                access_key.as_deref(),
                secret_key.as_deref(),
            )
            .await?,
        ),
    };
    Ok(bucket)
}

/// Reject keys no backend should ever be asked to store.
pub(crate) fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.contains("//") {
        return Err(StoreError::InvalidKey(format!("{:?}", key)));
    }
    Ok(())
}

/// [`Bucket`] over a local directory through `object_store`.
///
/// `object_store` paths cannot end in `/`, and on disk `foo/` is the
/// directory holding the package's archives, so directory keys are refused.
/// `LocalFileSystem` stores no attributes either: headers are not persisted.
#[derive(Debug, Clone)]
pub struct ObjectStoreBucket {
    name: String,
    inner: Arc<dyn ObjectStore>,
}

impl ObjectStoreBucket {
    /// Open (creating if needed) `path` as the bucket root.
    pub async fn local(name: &str, path: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            inner: Arc::new(store),
        })
    }

    fn object_path(key: &str) -> Result<ObjectPath> {
        check_key(key)?;
        if key.ends_with('/') {
            return Err(StoreError::InvalidKey(format!(
                "{}: local storage cannot hold a key ending in '/'",
                key
            )));
        }
        ObjectPath::parse(key).map_err(|e| StoreError::InvalidKey(format!("{}: {}", key, e)))
    }
}

#[async_trait]
impl Bucket for ObjectStoreBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_directory_keys(&self) -> bool {
        false
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let items: Vec<_> = self
            .inner
            .list(None)
            .try_collect()
            .await
            .map_err(|e| StoreError::object_store("", e))?;

        let keys: Vec<String> = items
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect();
        debug!(bucket = %self.name, count = keys.len(), "listed bucket keys");
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = Self::object_path(key)?;
        let result = self
            .inner
            .get(&path)
            .await
            .map_err(|e| StoreError::object_store(key, e))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| StoreError::object_store(key, e))?;

        debug!(bucket = %self.name, key = %key, size = bytes.len(), "fetched object");
        Ok(bytes)
    }

    async fn put(&self, key: &str, body: Bytes, headers: &ObjectHeaders) -> Result<()> {
        let path = Self::object_path(key)?;
        let size = body.len();

        self.inner
            .put(&path, body.into())
            .await
            .map_err(|e| StoreError::object_store(key, e))?;

        debug!(
            bucket = %self.name,
            key = %key,
            size = size,
            content_type = %headers.content_type,
            "stored object"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    headers: ObjectHeaders,
}

/// [`Bucket`] held in memory. Clones share the same objects.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    name: String,
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
}

impl MemoryBucket {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Headers the object at `key` was last written with.
    pub fn headers(&self, key: &str) -> Option<ObjectHeaders> {
        self.objects.read().get(key).map(|o| o.headers.clone())
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.objects.read().keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        check_key(key)?;
        self.objects
            .read()
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, headers: &ObjectHeaders) -> Result<()> {
        check_key(key)?;
        debug!(
            bucket = %self.name,
            key = %key,
            size = body.len(),
            acl = %headers.acl,
            "stored object"
        );
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                body,
                headers: headers.clone(),
            },
        );
        Ok(())
    }
}
