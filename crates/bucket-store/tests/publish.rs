//! Integration tests for publishing releases end to end

use std::path::Path;
use std::sync::Arc;

use bucket_store::{
    BackendConfig, Bucket, GatewayConfig, IndexEntry, MemoryBucket, PackageRelease, StorageGateway,
    StoreError, HTML_CONTENT_TYPE, INDEX_CACHE_CONTROL, MASTER_INDEX_KEY,
};

fn stage(dist: &Path, files: &[&str]) {
    for file in files {
        std::fs::write(dist.join(file), format!("contents of {}", file)).unwrap();
    }
}

fn release(name: &str, version: &str, files: &[&str], dist: &Path) -> PackageRelease {
    PackageRelease::new(
        name,
        version,
        files.iter().map(|f| f.to_string()).collect(),
        dist,
    )
    .unwrap()
}

fn labels(gateway_index: &bucket_store::Index) -> Vec<String> {
    gateway_index
        .entries()
        .map(IndexEntry::label)
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_publish_to_empty_bucket_then_second_version() {
    let dist = tempfile::tempdir().unwrap();
    stage(dist.path(), &["demo-1.0.tar.gz", "demo-2.0.tar.gz"]);

    let config = GatewayConfig {
        bucket: "test-bucket".to_string(),
        backend: BackendConfig::Memory,
        ..Default::default()
    };
    let gateway = StorageGateway::from_config(&config).await.unwrap();

    let first = release("demo", "1.0", &["demo-1.0.tar.gz"], dist.path());
    let report = gateway.publish(&first).await.unwrap();
    assert_eq!(report.uploaded, vec!["demo/demo-1.0.tar.gz"]);
    assert_eq!(report.index_key, "demo/index.html");

    let index = gateway.get_index(&first).await;
    assert_eq!(labels(&index), vec!["demo-1.0.tar.gz"]);
    let master = gateway.get_master_index().await;
    assert_eq!(master.packages().collect::<Vec<_>>(), vec!["demo"]);

    let second = release("demo", "2.0", &["demo-2.0.tar.gz"], dist.path());
    let report = gateway.publish(&second).await.unwrap();
    assert_eq!(report.index_entries, 2);
    assert_eq!(report.master_packages, 1);

    let index = gateway.get_index(&second).await;
    assert_eq!(labels(&index), vec!["demo-1.0.tar.gz", "demo-2.0.tar.gz"]);
    let master = gateway.get_master_index().await;
    assert_eq!(master.packages().collect::<Vec<_>>(), vec!["demo"]);
}

#[tokio::test]
async fn test_master_index_written_lists_package() {
    let dist = tempfile::tempdir().unwrap();
    stage(dist.path(), &["demo-1.0.tar.gz"]);

    let config = GatewayConfig {
        bucket: "test-bucket".to_string(),
        backend: BackendConfig::Memory,
        ..Default::default()
    };
    let gateway = StorageGateway::from_config(&config).await.unwrap();
    gateway
        .publish(&release("demo", "1.0", &["demo-1.0.tar.gz"], dist.path()))
        .await
        .unwrap();

    let html = gateway.bucket().get(MASTER_INDEX_KEY).await.unwrap();
    let master = bucket_store::Index::parse(std::str::from_utf8(&html).unwrap());
    assert_eq!(labels(&master), vec!["demo"]);
    assert_eq!(master.get("demo").unwrap().href(), "demo/");
}

#[tokio::test]
async fn test_republish_same_file_is_idempotent() {
    let dist = tempfile::tempdir().unwrap();
    stage(dist.path(), &["demo-1.0.tar.gz"]);

    let config = GatewayConfig {
        bucket: "test-bucket".to_string(),
        backend: BackendConfig::Memory,
        ..Default::default()
    };
    let gateway = StorageGateway::from_config(&config).await.unwrap();
    let r = release("demo", "1.0", &["demo-1.0.tar.gz"], dist.path());

    gateway.publish(&r).await.unwrap();
    let first = gateway.bucket().get("demo/index.html").await.unwrap();
    gateway.publish(&r).await.unwrap();
    let second = gateway.bucket().get("demo/index.html").await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_publish_to_local_directory() {
    let dist = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    stage(dist.path(), &["Demo_Pkg-1.0.tar.gz", "other-0.1.tar.gz"]);

    let config = GatewayConfig {
        bucket: "local".to_string(),
        backend: BackendConfig::Local {
            path: root.path().to_path_buf(),
        },
        ..Default::default()
    };
    let gateway = StorageGateway::from_config(&config).await.unwrap();

    gateway
        .publish(&release("Demo_Pkg", "1.0", &["Demo_Pkg-1.0.tar.gz"], dist.path()))
        .await
        .unwrap();
    gateway
        .publish(&release("other", "0.1", &["other-0.1.tar.gz"], dist.path()))
        .await
        .unwrap();

    assert!(root.path().join("demo-pkg/Demo_Pkg-1.0.tar.gz").exists());
    assert!(root.path().join("demo-pkg/index.html").exists());
    assert!(root.path().join("other/other-0.1.tar.gz").exists());

    let html = std::fs::read_to_string(root.path().join("index.html")).unwrap();
    let master = bucket_store::Index::parse(&html);
    assert_eq!(labels(&master), vec!["demo-pkg", "other"]);
    assert_eq!(master.get("demo-pkg").unwrap().href(), "demo-pkg/");
}

#[tokio::test]
async fn test_publish_with_secret_prefix() {
    let dist = tempfile::tempdir().unwrap();
    stage(dist.path(), &["demo-1.0.tar.gz"]);

    let config = GatewayConfig {
        bucket: "test-bucket".to_string(),
        secret: Some("xyz".to_string()),
        backend: BackendConfig::Memory,
        ..Default::default()
    };
    let gateway = StorageGateway::from_config(&config).await.unwrap();
    let r = release("demo", "1.0", &["demo-1.0.tar.gz"], dist.path());

    let report = gateway.publish(&r).await.unwrap();
    assert_eq!(report.uploaded, vec!["xyz/demo/demo-1.0.tar.gz"]);
    assert_eq!(report.index_key, "xyz/demo/index.html");

    let index = gateway.get_index(&r).await;
    assert_eq!(labels(&index), vec!["demo-1.0.tar.gz"]);
}

#[tokio::test]
async fn test_empty_bucket_name_rejected() {
    let config = GatewayConfig {
        backend: BackendConfig::Memory,
        ..Default::default()
    };
    assert!(StorageGateway::from_config(&config).await.is_err());
}

#[tokio::test]
async fn test_bare_publish_serves_listing_from_directory_key() {
    let dist = tempfile::tempdir().unwrap();
    stage(dist.path(), &["foo-1.0.tar.gz", "foo-1.1.tar.gz"]);

    let bucket = MemoryBucket::new("test-bucket");
    let config = GatewayConfig {
        bucket: "test-bucket".to_string(),
        bare: true,
        backend: BackendConfig::Memory,
        ..Default::default()
    };
    let gateway = StorageGateway::with_bucket(Arc::new(bucket.clone()), &config).unwrap();

    let first = release("foo", "1.0", &["foo-1.0.tar.gz"], dist.path());
    let report = gateway.publish(&first).await.unwrap();
    assert_eq!(report.index_key, "foo/");

    let keys = bucket.list_keys().await.unwrap();
    assert!(keys.iter().any(|k| k == "foo/"));
    assert!(!keys.iter().any(|k| k == "foo"));

    let headers = bucket.headers("foo/").unwrap();
    assert_eq!(headers.content_type, HTML_CONTENT_TYPE);
    assert_eq!(headers.cache_control.as_deref(), Some(INDEX_CACHE_CONTROL));

    let second = release("foo", "1.1", &["foo-1.1.tar.gz"], dist.path());
    gateway.publish(&second).await.unwrap();

    let html = bucket.get("foo/").await.unwrap();
    let index = bucket_store::Index::parse(std::str::from_utf8(&html).unwrap());
    assert_eq!(labels(&index), vec!["foo-1.0.tar.gz", "foo-1.1.tar.gz"]);

    let master = gateway.get_master_index().await;
    assert_eq!(master.packages().collect::<Vec<_>>(), vec!["foo"]);
}

#[tokio::test]
async fn test_bare_mode_rejected_for_local_directory() {
    let root = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        bucket: "local".to_string(),
        bare: true,
        backend: BackendConfig::Local {
            path: root.path().to_path_buf(),
        },
        ..Default::default()
    };

    let err = StorageGateway::from_config(&config).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig(_)));
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}
