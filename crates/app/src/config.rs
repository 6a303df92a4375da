use std::fs;
use std::path::{Path, PathBuf};

use bucket_store::BackendConfig;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "s3pypi";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Publishing defaults read from the config file. Command-line flags
/// override these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Bucket to publish to
    #[serde(default)]
    pub bucket: Option<String>,
    /// Region of the bucket (S3 only)
    #[serde(default)]
    pub region: Option<String>,
    /// Path prefix packages are nested under
    #[serde(default)]
    pub secret: Option<String>,
    /// Store package listings at `<package>/` instead of `<package>/index.html`
    #[serde(default)]
    pub bare: bool,
    /// Write objects with the private ACL
    #[serde(default)]
    pub private: bool,
    /// Directory holding the built archives
    #[serde(default)]
    pub dist_dir: Option<PathBuf>,
    /// Storage backend
    #[serde(default)]
    pub backend: BackendConfig,
}

impl AppConfig {
    /// Default config location, `~/.s3pypi/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(format!(".{}", APP_NAME)).join(CONFIG_FILE_NAME))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// read if present and defaults are used otherwise. Returns the config
    /// together with the file it was read from.
    pub fn load(explicit: Option<PathBuf>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path));
                }
                let config = Self::from_file(&path)?;
                Ok((config, Some(path)))
            }
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => {
                    let config = Self::from_file(&path)?;
                    Ok((config, Some(path)))
                }
                None => Ok((Self::default(), None)),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
