//! A single package release handed to the publisher.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Default local staging directory for built archives.
pub const DEFAULT_DIST_DIR: &str = "dist";

static SEPARATOR_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_.]+").unwrap());

/// Normalize a project name the way PEP 503 index paths expect it:
/// lowercase, with every run of `-`, `_` and `.` collapsed into one `-`.
pub fn normalize_name(name: &str) -> String {
    SEPARATOR_RUN
        .replace_all(&name.trim().to_lowercase(), "-")
        .into_owned()
}

/// One version of a package and the archive files that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRelease {
    name: String,
    version: String,
    files: Vec<String>,
    dist_dir: PathBuf,
}

impl PackageRelease {
    /// Build a release, normalizing the package name.
    ///
    /// Filenames must be bare names (no path separators); the archives are
    /// read from `dist_dir` at upload time.
    pub fn new(
        name: &str,
        version: impl Into<String>,
        files: Vec<String>,
        dist_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let normalized = normalize_name(name);
        if normalized.is_empty() || normalized == "-" {
            return Err(StoreError::InvalidRelease(format!(
                "package name '{}' is empty after normalization",
                name
            )));
        }
        if let Some(bad) = files
            .iter()
            .find(|f| f.is_empty() || f.contains('/') || f.contains('\\'))
        {
            return Err(StoreError::InvalidRelease(format!(
                "'{}' is not a plain archive filename",
                bad
            )));
        }

        Ok(Self {
            name: normalized,
            version: version.into(),
            files,
            dist_dir: dist_dir.into(),
        })
    }

    /// Normalized package name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Storage directory holding every version of this package.
    pub fn directory(&self) -> &str {
        &self.name
    }

    /// Local staging directory the archives are read from.
    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    /// Local path of one of this release's archives.
    pub fn local_path(&self, filename: &str) -> PathBuf {
        self.dist_dir.join(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Django"), "django");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("My__Weird.-Package"), "my-weird-package");
        assert_eq!(normalize_name("already-normal"), "already-normal");
    }

    #[test]
    fn test_release_directory_is_normalized_name() {
        let release = PackageRelease::new(
            "Foo_Bar",
            "1.0",
            vec!["Foo_Bar-1.0.tar.gz".to_string()],
            DEFAULT_DIST_DIR,
        )
        .unwrap();

        assert_eq!(release.name(), "foo-bar");
        assert_eq!(release.directory(), "foo-bar");
        assert_eq!(release.version(), "1.0");
        assert_eq!(
            release.local_path("Foo_Bar-1.0.tar.gz"),
            PathBuf::from("dist/Foo_Bar-1.0.tar.gz")
        );
    }

    #[test]
    fn test_release_rejects_bad_input() {
        assert!(PackageRelease::new("___", "1.0", vec![], "dist").is_err());
        assert!(PackageRelease::new("ok", "1.0", vec!["../evil.tar.gz".into()], "dist").is_err());
        assert!(PackageRelease::new("ok", "1.0", vec!["".into()], "dist").is_err());
    }
}
