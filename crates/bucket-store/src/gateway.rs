//! Fetch-merge-write cycle between the index model and a bucket.
//!
//! Reads degrade: a listing or index that cannot be fetched is treated as
//! empty so a fresh (or flaky) bucket never blocks a publish. Writes do not:
//! a failed upload or index write is returned to the caller.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::index::{Index, MasterIndex};
use crate::release::PackageRelease;
use crate::storage::{open_bucket, Acl, BackendConfig, Bucket, ObjectHeaders};

/// Key of the bucket-wide package listing
pub const MASTER_INDEX_KEY: &str = "index.html";
/// Filename of a per-package listing outside bare mode
pub const INDEX_FILENAME: &str = "index.html";

pub const HTML_CONTENT_TYPE: &str = "text/html";
pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-gzip";
pub const INDEX_CACHE_CONTROL: &str = "public, must-revalidate, proxy-revalidate, max-age=0";

/// Where and how a gateway publishes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bucket name
    pub bucket: String,
    /// Optional region (S3 only)
    #[serde(default)]
    pub region: Option<String>,
    /// Path segment every package key is nested under
    #[serde(default)]
    pub secret: Option<String>,
    /// Serve each package listing from the directory key itself
    /// (`foo/`) instead of `foo/index.html`
    #[serde(default)]
    pub bare: bool,
    /// Write objects with the `private` ACL instead of `public-read`
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl GatewayConfig {
    pub fn acl(&self) -> Acl {
        Acl::from_private(self.private)
    }
}

/// Outcome of [`StorageGateway::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub package: String,
    pub version: String,
    /// Keys of the uploaded archives, in release order
    pub uploaded: Vec<String>,
    pub index_key: String,
    /// Entries in the per-package index after the publish
    pub index_entries: usize,
    /// Packages in the master index after the publish
    pub master_packages: usize,
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "published {} {} ({} file(s))",
            self.package,
            self.version,
            self.uploaded.len()
        )?;
        for key in &self.uploaded {
            writeln!(f, "  {}", key)?;
        }
        write!(
            f,
            "  index {} lists {} file(s); master index lists {} package(s)",
            self.index_key, self.index_entries, self.master_packages
        )
    }
}

/// The only component that talks to the bucket.
///
/// Every read and write is a separate round trip and writes are
/// unconditional (no ETag / If-Match). Two publishers racing on the same
/// package or on the master index can both read the same state and the
/// later write drops the earlier one's entry. Publishing is expected to be
/// serialized by the caller.
#[derive(Debug, Clone)]
pub struct StorageGateway {
    bucket: Arc<dyn Bucket>,
    secret: Option<String>,
    index_filename: &'static str,
    acl: Acl,
}

impl StorageGateway {
    /// Connect to the configured backend.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(StoreError::InvalidConfig(
                "bucket name must not be empty".to_string(),
            ));
        }
        let bucket =
            open_bucket(&config.bucket, config.region.as_deref(), &config.backend).await?;
        Self::with_bucket(bucket, config)
    }

    /// Build a gateway over an existing bucket; `config.backend`,
    /// `config.bucket` and `config.region` are ignored.
    ///
    /// Bare mode needs a bucket that stores `<package>/` as an object of its
    /// own and is refused here otherwise, before anything is uploaded.
    pub fn with_bucket(bucket: Arc<dyn Bucket>, config: &GatewayConfig) -> Result<Self> {
        if config.bare && !bucket.supports_directory_keys() {
            return Err(StoreError::InvalidConfig(format!(
                "bucket '{}' cannot store keys ending in '/', bare mode is unavailable",
                bucket.name()
            )));
        }

        let secret = config
            .secret
            .as_deref()
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            bucket,
            secret,
            index_filename: if config.bare { "" } else { INDEX_FILENAME },
            acl: config.acl(),
        })
    }

    pub fn bucket(&self) -> &Arc<dyn Bucket> {
        &self.bucket
    }

    /// `[secret/]<directory>/<filename>`
    pub fn object_key(&self, release: &PackageRelease, filename: &str) -> String {
        let path = format!("{}/{}", release.directory(), filename);
        match &self.secret {
            Some(secret) => format!("{}/{}", secret, path),
            None => path,
        }
    }

    /// Key of the release's per-package listing; ends in `/` in bare mode.
    pub fn index_key(&self, release: &PackageRelease) -> String {
        self.object_key(release, self.index_filename)
    }

    fn html_headers(&self) -> ObjectHeaders {
        ObjectHeaders {
            content_type: HTML_CONTENT_TYPE.to_string(),
            cache_control: Some(INDEX_CACHE_CONTROL.to_string()),
            acl: self.acl,
        }
    }

    fn archive_headers(&self) -> ObjectHeaders {
        ObjectHeaders {
            content_type: ARCHIVE_CONTENT_TYPE.to_string(),
            cache_control: None,
            acl: self.acl,
        }
    }

    /// Derive the master index from a live listing of the bucket.
    /// Any listing failure yields an empty index.
    pub async fn get_master_index(&self) -> MasterIndex {
        match self.bucket.list_keys().await {
            Ok(keys) => MasterIndex::from_keys(keys),
            Err(e) => {
                warn!(bucket = %self.bucket.name(), error = %e, "failed to list bucket, assuming no packages");
                MasterIndex::new()
            }
        }
    }

    /// Write the master index to the bucket root. Last writer wins.
    pub async fn put_master_index(&self, index: &MasterIndex) -> Result<()> {
        let body = Bytes::from(index.to_html());
        self.bucket
            .put(MASTER_INDEX_KEY, body, &self.html_headers())
            .await?;
        info!(bucket = %self.bucket.name(), packages = index.len(), "master index written");
        Ok(())
    }

    /// Fetch and parse the release's per-package listing.
    /// A missing, unreadable or non-UTF-8 listing yields an empty index.
    pub async fn get_index(&self, release: &PackageRelease) -> Index {
        let key = self.index_key(release);
        match self.bucket.get(&key).await {
            Ok(body) => match String::from_utf8(body.to_vec()) {
                Ok(html) => Index::parse(&html),
                Err(e) => {
                    warn!(key = %key, error = %e, "package index is not UTF-8, starting empty");
                    Index::new()
                }
            },
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "no package index yet");
                Index::new()
            }
            Err(e) => {
                warn!(key = %key, error = %e, "failed to fetch package index, starting empty");
                Index::new()
            }
        }
    }

    pub async fn put_index(&self, release: &PackageRelease, index: &Index) -> Result<()> {
        let key = self.index_key(release);
        let body = Bytes::from(index.to_html());
        self.bucket.put(&key, body, &self.html_headers()).await?;
        info!(key = %key, entries = index.len(), "package index written");
        Ok(())
    }

    /// Upload every archive of the release from its staging directory.
    ///
    /// Stops at the first failure; a missing local file is an error, never
    /// skipped. Returns the keys written.
    pub async fn put_package(&self, release: &PackageRelease) -> Result<Vec<String>> {
        let mut uploaded = Vec::with_capacity(release.files().len());
        for filename in release.files() {
            let key = self.object_key(release, filename);
            let body = read_archive(&release.local_path(filename)).await?;
            let size = body.len();

            self.bucket.put(&key, body, &self.archive_headers()).await?;
            info!(key = %key, size = size, "uploaded archive");
            uploaded.push(key);
        }
        Ok(uploaded)
    }

    /// Publish a release: list packages, merge the release's files into its
    /// listing, upload the archives, then write both listings back.
    ///
    /// The master index is the listing taken before the upload plus this
    /// release's directory. Under a secret prefix the package is not
    /// reachable at `<directory>/`, so it is not added.
    pub async fn publish(&self, release: &PackageRelease) -> Result<PublishReport> {
        let mut master = self.get_master_index().await;
        let mut index = self.get_index(release).await;
        for filename in release.files() {
            if !index.add(filename.as_str(), filename.as_str()) {
                debug!(file = %filename, "already listed in package index");
            }
        }

        let uploaded = self.put_package(release).await?;
        self.put_index(release, &index).await?;

        if self.secret.is_none() {
            master.insert(release.directory());
        }
        self.put_master_index(&master).await?;

        Ok(PublishReport {
            package: release.name().to_string(),
            version: release.version().to_string(),
            uploaded,
            index_key: self.index_key(release),
            index_entries: index.len(),
            master_packages: master.len(),
        })
    }
}

/// Read a local archive whole; the handle is closed when this returns.
async fn read_archive(path: &Path) -> Result<Bytes> {
    let io_error = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(io_error)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await.map_err(io_error)?;
    Ok(Bytes::from(buf))
}
