//! Find built archives in the staging directory and group them into releases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bucket_store::{normalize_name, PackageRelease, StoreError};

/// Archive suffixes picked up from the staging directory, longest first.
const SDIST_SUFFIXES: &[&str] = &[".tar.gz", ".tar.bz2", ".tgz", ".zip"];
const WHEEL_SUFFIX: &str = ".whl";

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("failed to read staging directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot tell package name and version from '{0}'")]
    UnrecognizedArchive(String),

    #[error("no archives found in {}", .0.display())]
    NothingToPublish(PathBuf),

    #[error(transparent)]
    Release(#[from] StoreError),
}

/// Split an archive filename into (project name, version).
///
/// Wheels follow `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`;
/// source archives follow `{name}-{version}{suffix}`.
pub fn parse_archive_name(filename: &str) -> Option<(String, String)> {
    if let Some(stem) = filename.strip_suffix(WHEEL_SUFFIX) {
        let parts: Vec<&str> = stem.split('-').collect();
        if parts.len() < 5 || parts[0].is_empty() || parts[1].is_empty() {
            return None;
        }
        return Some((parts[0].to_string(), parts[1].to_string()));
    }

    let stem = SDIST_SUFFIXES
        .iter()
        .find_map(|suffix| filename.strip_suffix(suffix))?;
    let (name, version) = stem.rsplit_once('-')?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

pub fn is_archive(filename: &str) -> bool {
    filename.ends_with(WHEEL_SUFFIX) || SDIST_SUFFIXES.iter().any(|s| filename.ends_with(s))
}

/// List archive filenames in `dist_dir`, sorted.
pub fn list_archives(dist_dir: &Path) -> Result<Vec<String>, DiscoverError> {
    let read_dir_error = |source: std::io::Error| DiscoverError::ReadDir {
        path: dist_dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dist_dir).map_err(read_dir_error)? {
        let entry = entry.map_err(read_dir_error)?;
        if !entry.file_type().map_err(read_dir_error)?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if is_archive(name) {
                files.push(name.to_string());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Group archive filenames by normalized name and version.
///
/// Every file must parse; an unrecognized archive name is an error rather
/// than being skipped.
pub fn group_releases(
    files: &[String],
    dist_dir: &Path,
) -> Result<Vec<PackageRelease>, DiscoverError> {
    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
    for file in files {
        let (name, version) = parse_archive_name(file)
            .ok_or_else(|| DiscoverError::UnrecognizedArchive(file.clone()))?;
        groups
            .entry((normalize_name(&name), version))
            .or_default()
            .push(file.clone());
    }

    groups
        .into_iter()
        .map(|((name, version), files)| {
            PackageRelease::new(&name, version, files, dist_dir).map_err(DiscoverError::from)
        })
        .collect()
}

/// Every release found in `dist_dir`.
pub fn discover_releases(dist_dir: &Path) -> Result<Vec<PackageRelease>, DiscoverError> {
    let files = list_archives(dist_dir)?;
    if files.is_empty() {
        return Err(DiscoverError::NothingToPublish(dist_dir.to_path_buf()));
    }
    group_releases(&files, dist_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sdist_names() {
        assert_eq!(
            parse_archive_name("demo-1.0.tar.gz"),
            Some(("demo".to_string(), "1.0".to_string()))
        );
        assert_eq!(
            parse_archive_name("my-package-2.1.0rc1.zip"),
            Some(("my-package".to_string(), "2.1.0rc1".to_string()))
        );
        assert_eq!(parse_archive_name("noversion.tar.gz"), None);
        assert_eq!(parse_archive_name("README.md"), None);
    }

    #[test]
    fn test_parse_wheel_names() {
        assert_eq!(
            parse_archive_name("my_package-2.1.0-py3-none-any.whl"),
            Some(("my_package".to_string(), "2.1.0".to_string()))
        );
        assert_eq!(
            parse_archive_name("demo-1.0-1-cp311-cp311-manylinux_2_17_x86_64.whl"),
            Some(("demo".to_string(), "1.0".to_string()))
        );
        assert_eq!(parse_archive_name("broken-1.0.whl"), None);
    }

    #[test]
    fn test_discover_groups_by_release() {
        let dist = tempfile::tempdir().unwrap();
        for file in [
            "My.Package-1.0.tar.gz",
            "my_package-1.0-py3-none-any.whl",
            "my_package-1.1-py3-none-any.whl",
            "notes.txt",
        ] {
            std::fs::write(dist.path().join(file), b"x").unwrap();
        }
        std::fs::create_dir(dist.path().join("subdir.zip")).unwrap();

        let releases = discover_releases(dist.path()).unwrap();
        assert_eq!(releases.len(), 2);

        assert_eq!(releases[0].name(), "my-package");
        assert_eq!(releases[0].version(), "1.0");
        assert_eq!(
            releases[0].files(),
            &["My.Package-1.0.tar.gz", "my_package-1.0-py3-none-any.whl"]
        );
        assert_eq!(releases[1].version(), "1.1");
        assert_eq!(releases[1].dist_dir(), dist.path());
    }

    #[test]
    fn test_discover_empty_directory() {
        let dist = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_releases(dist.path()),
            Err(DiscoverError::NothingToPublish(_))
        ));
    }

    #[test]
    fn test_discover_missing_directory() {
        let dist = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_releases(&dist.path().join("missing")),
            Err(DiscoverError::ReadDir { .. })
        ));
    }

    #[test]
    fn test_unrecognized_archive_is_error() {
        let files = vec!["noversion.tar.gz".to_string()];
        assert!(matches!(
            group_releases(&files, Path::new("dist")),
            Err(DiscoverError::UnrecognizedArchive(_))
        ));
    }
}
