//! Static PyPI index publishing on object storage
//!
//! This crate lays package archives out in a bucket so that the bucket can be
//! browsed as a PEP 503 "simple" package index:
//!
//! - `index.html` at the root lists every package directory,
//! - `<package>/index.html` (or `<package>/` in bare mode) lists every
//!   archive published for that package (bare mode needs a backend that
//!   stores `<package>/` as its own object: S3 or memory),
//! - `<package>/<archive>` holds the archives themselves, optionally nested
//!   under a secret path prefix.
//!
//! # Example
//!
//! ```rust,no_run
//! use bucket_store::{BackendConfig, GatewayConfig, PackageRelease, StorageGateway};
//!
//! # async fn example() -> Result<(), bucket_store::StoreError> {
//! let config = GatewayConfig {
//!     bucket: "my-pypi".to_string(),
//!     backend: BackendConfig::default(),
//!     ..Default::default()
//! };
//! let gateway = StorageGateway::from_config(&config).await?;
//!
//! let release = PackageRelease::new(
//!     "demo",
//!     "1.0",
//!     vec!["demo-1.0.tar.gz".to_string()],
//!     "dist",
//! )?;
//! let report = gateway.publish(&release).await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

mod error;
mod gateway;
mod index;
mod release;
mod s3;
mod storage;

pub use error::{Result, StoreError};
pub use gateway::{
    GatewayConfig, PublishReport, StorageGateway, ARCHIVE_CONTENT_TYPE, HTML_CONTENT_TYPE,
    INDEX_CACHE_CONTROL, INDEX_FILENAME, MASTER_INDEX_KEY,
};
pub use index::{Index, IndexEntry, MasterIndex};
pub use release::{normalize_name, PackageRelease, DEFAULT_DIST_DIR};
pub use s3::S3Bucket;
pub use storage::{
    open_bucket, Acl, BackendConfig, Bucket, MemoryBucket, ObjectHeaders, ObjectStoreBucket,
};
