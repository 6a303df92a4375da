use std::path::{Path, PathBuf};

use clap::Args;
use tracing::info;

use bucket_store::{
    normalize_name, BackendConfig, GatewayConfig, PackageRelease, StorageGateway, StoreError,
    DEFAULT_DIST_DIR,
};

use crate::config::AppConfig;
use crate::discover::{self, DiscoverError};

/// Bucket name used when publishing into a local directory without one.
const LOCAL_BUCKET_NAME: &str = "local";

#[derive(Args, Debug, Clone, Default)]
pub struct Publish {
    /// Bucket to publish to (overrides the config file)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket region
    #[arg(long)]
    pub region: Option<String>,

    /// Nest every package under this path prefix
    #[arg(long)]
    pub secret: Option<String>,

    /// Store package listings at `<package>/` instead of `<package>/index.html`
    #[arg(long)]
    pub bare: bool,

    /// Write objects with the private ACL instead of public-read
    #[arg(long)]
    pub private: bool,

    /// Directory holding the built archives (default: dist)
    #[arg(long)]
    pub dist_dir: Option<PathBuf>,

    /// S3-compatible endpoint URL (e.g., http://localhost:9000 for MinIO)
    #[arg(long, conflicts_with = "local")]
    pub endpoint: Option<String>,

    /// Publish into a local directory instead of a bucket
    #[arg(long)]
    pub local: Option<PathBuf>,

    /// Package name; requires --version and publishes one release
    #[arg(long, requires = "version")]
    pub name: Option<String>,

    /// Package version; requires --name
    #[arg(long, requires = "name")]
    pub version: Option<String>,

    /// Archive filenames to publish (default: every archive in the dist directory)
    pub files: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("no bucket configured: pass --bucket or set `bucket` in the config file")]
    NoBucket,

    #[error("no archive in {} matches {name} {version}", .dist_dir.display())]
    NoMatchingArchives {
        name: String,
        version: String,
        dist_dir: PathBuf,
    },

    #[error("discovery failed: {0}")]
    Discover(#[from] DiscoverError),

    #[error("publish failed: {0}")]
    Store(#[from] StoreError),
}

impl Publish {
    /// Merge flags over the config file into the gateway configuration.
    pub fn gateway_config(&self, config: &AppConfig) -> Result<GatewayConfig, PublishError> {
        let backend = if let Some(path) = &self.local {
            BackendConfig::Local { path: path.clone() }
        } else if let Some(endpoint) = &self.endpoint {
            match &config.backend {
                BackendConfig::S3 {
                    access_key,
                    secret_key,
                    ..
                } => BackendConfig::S3 {
                    endpoint: Some(endpoint.clone()),
                    access_key: access_key.clone(),
                    secret_key: secret_key.clone(),
                },
                _ => BackendConfig::S3 {
                    endpoint: Some(endpoint.clone()),
                    access_key: None,
                    secret_key: None,
                },
            }
        } else {
            config.backend.clone()
        };

        let bucket = self
            .bucket
            .clone()
            .or_else(|| config.bucket.clone())
            .or_else(|| {
                matches!(backend, BackendConfig::Local { .. }).then(|| LOCAL_BUCKET_NAME.to_string())
            })
            .ok_or(PublishError::NoBucket)?;

        Ok(GatewayConfig {
            bucket,
            region: self.region.clone().or_else(|| config.region.clone()),
            secret: self.secret.clone().or_else(|| config.secret.clone()),
            bare: self.bare || config.bare,
            private: self.private || config.private,
            backend,
        })
    }

    pub fn dist_dir(&self, config: &AppConfig) -> PathBuf {
        self.dist_dir
            .clone()
            .or_else(|| config.dist_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIST_DIR))
    }

    /// Work out which releases to publish from the flags and the dist directory.
    pub fn releases(&self, dist_dir: &Path) -> Result<Vec<PackageRelease>, PublishError> {
        let (name, version) = match (&self.name, &self.version) {
            (Some(name), Some(version)) => (name, version),
            _ if self.files.is_empty() => return Ok(discover::discover_releases(dist_dir)?),
            _ => return Ok(discover::group_releases(&self.files, dist_dir)?),
        };

        let files = if self.files.is_empty() {
            let wanted = normalize_name(name);
            discover::list_archives(dist_dir)?
                .into_iter()
                .filter(|file| {
                    discover::parse_archive_name(file)
                        .map(|(n, v)| normalize_name(&n) == wanted && &v == version)
                        .unwrap_or(false)
                })
                .collect()
        } else {
            self.files.clone()
        };

        if files.is_empty() {
            return Err(PublishError::NoMatchingArchives {
                name: name.clone(),
                version: version.clone(),
                dist_dir: dist_dir.to_path_buf(),
            });
        }

        Ok(vec![PackageRelease::new(
            name,
            version.clone(),
            files,
            dist_dir,
        )?])
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Publish {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = self.gateway_config(&ctx.config)?;
        let dist_dir = self.dist_dir(&ctx.config);
        let releases = self.releases(&dist_dir)?;

        info!(
            bucket = %config.bucket,
            releases = releases.len(),
            dist_dir = %dist_dir.display(),
            config_file = ?ctx.config_path,
            "publishing"
        );
        let gateway = StorageGateway::from_config(&config).await?;

        let mut reports = Vec::with_capacity(releases.len());
        for release in &releases {
            let report = gateway.publish(release).await?;
            reports.push(report.to_string());
        }

        Ok(reports.join("\n"))
    }
}
