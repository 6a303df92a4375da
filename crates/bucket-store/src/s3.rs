//! S3 backend on the AWS SDK.
//!
//! Keys go to S3 exactly as given, so `foo/` is an object distinct from
//! `foo` and from `foo/index.html`. The canned ACL, content type and cache
//! control travel with each `PutObject`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::storage::{check_key, Acl, Bucket, ObjectHeaders};

const CREDENTIALS_PROVIDER: &str = "pypi-bucket-config";

/// [`Bucket`] backed by an S3 (or S3-compatible) bucket.
#[derive(Debug, Clone)]
pub struct S3Bucket {
    name: String,
    client: Client,
}

impl S3Bucket {
    /// Build a client for `bucket`.
    ///
    /// Region and credentials fall back to the AWS default provider chain.
    /// A custom endpoint switches to path-style addressing, which is what
    /// MinIO and most S3-compatible stores expect.
    pub async fn new(
        bucket: &str,
        region: Option<&str>,
        endpoint: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => {
                loader = loader.credentials_provider(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    CREDENTIALS_PROVIDER,
                ));
            }
            (None, None) => {}
            _ => {
                return Err(StoreError::InvalidConfig(
                    "access_key and secret_key must be set together".to_string(),
                ))
            }
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            name: bucket.to_string(),
            client: Client::from_conf(builder.build()),
        })
    }
}

fn canned_acl(acl: Acl) -> ObjectCannedAcl {
    match acl {
        Acl::PublicRead => ObjectCannedAcl::PublicRead,
        Acl::Private => ObjectCannedAcl::Private,
    }
}

#[async_trait]
impl Bucket for S3Bucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.name)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| StoreError::s3("", e))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );
        }
        debug!(bucket = %self.name, count = keys.len(), "listed bucket keys");
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        check_key(key)?;
        let output = match self
            .client
            .get_object()
            .bucket(&self.name)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(StoreError::s3(key, e)),
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::s3(key, e))?
            .into_bytes();
        debug!(bucket = %self.name, key = %key, size = bytes.len(), "fetched object");
        Ok(bytes)
    }

    async fn put(&self, key: &str, body: Bytes, headers: &ObjectHeaders) -> Result<()> {
        check_key(key)?;
        let size = body.len();

        self.client
            .put_object()
            .bucket(&self.name)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(headers.content_type.as_str())
            .set_cache_control(headers.cache_control.clone())
            .acl(canned_acl(headers.acl))
            .send()
            .await
            .map_err(|e| StoreError::s3(key, e))?;

        debug!(
            bucket = %self.name,
            key = %key,
            size = size,
            content_type = %headers.content_type,
            acl = %headers.acl,
            "stored object"
        );
        Ok(())
    }
}
