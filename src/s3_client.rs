//! Thin wrapper over `aws-sdk-s3`: put/get/head/delete, paginated listing and
//! presigned URLs.

use std::time::Duration;

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::instrument;

use crate::config::S3Config;
use crate::error::{Error, Result};

pub const PRESIGNED_GET_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// One page of a paginated object listing (`list_objects`).
pub struct ListPage {
    pub keys: Vec<String>,
    pub continuation_token: Option<String>,
}

#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    pub async fn new(config: &S3Config) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::new()
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style)
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "datas3t-config",
            ));
        } else {
            let loaded = aws_config::defaults(aws_sdk_s3::config::BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            if let Some(provider) = loaded.credentials_provider() {
                builder = builder.credentials_provider(provider);
            }
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }

    #[instrument(level = "debug", skip(self, body))]
    pub async fn put_object(&self, key: &str, body: Bytes) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await?;
        Ok(())
    }

    /// Like [`Self::put_object`] but streams the body from a file on disk
    /// instead of buffering it, for the (potentially large) tar blob.
    #[instrument(level = "debug", skip(self))]
    pub async fn put_object_file(&self, key: &str, path: &std::path::Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_object(&self, key: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?
            .into_bytes();
        Ok(bytes)
    }

    /// GETs the inclusive byte range `[start, end]` of `key`.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_object_range(&self, key: &str, start: i64, end: i64) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .range(format!("bytes={start}-{end}"))
            .send()
            .await?;
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?
            .into_bytes();
        Ok(bytes)
    }

    /// `size_bytes` of `key`, or `Ok(None)` if it does not exist.
    #[instrument(level = "debug", skip(self))]
    pub async fn head_object_size(&self, key: &str) -> Result<Option<i64>> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(resp) => Ok(Some(resp.content_length().unwrap_or(0))),
            Err(aws_sdk_s3::error::SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes `key`. Treats both 2xx and "not found" as success (spec §4.7,
    /// §9: at-least-once deletion must tolerate a key already gone).
    #[instrument(level = "debug", skip(self))]
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        match self.client.delete_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(()),
            Err(aws_sdk_s3::error::SdkError::ServiceError(e)) if e.raw().status().as_u16() == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// One page of objects under `prefix`. Pass the previous page's
    /// `continuation_token` back in to continue.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_objects(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
        if let Some(token) = continuation_token {
            req = req.continuation_token(token);
        }
        let resp = req.send().await?;
        let keys = resp
            .contents()
            .iter()
            .filter_map(|o| o.key().map(str::to_string))
            .collect();
        Ok(ListPage {
            keys,
            continuation_token: resp.next_continuation_token().map(str::to_string),
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn presign_get(&self, key: &str, byte_range: Option<(i64, i64)>) -> Result<String> {
        let config = PresigningConfig::expires_in(PRESIGNED_GET_EXPIRY)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let mut req = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some((start, end)) = byte_range {
            req = req.range(format!("bytes={start}-{end}"));
        }
        let presigned = req.presigned(config).await?;
        Ok(presigned.uri().to_string())
    }
}
