//! S3-compatible object store backed by the AWS SDK.

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use super::error::StorageError;
use super::traits::ObjectStore;
use super::types::ObjectMetadata;
use crate::config::StorageConfig;

/// Object store talking to an S3-compatible endpoint with static credentials
/// and path-style addressing.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    endpoint: String,
    verify_uploads: bool,
    multipart_threshold: u64,
    part_size: u64,
}

impl S3ObjectStore {
    /// Builds the client. Fails when the endpoint or either key is missing.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let endpoint = non_empty(config.endpoint.as_deref())
            .ok_or(StorageError::MissingCredential("endpoint"))?;
        let access_key = non_empty(config.access_key.as_deref())
            .ok_or(StorageError::MissingCredential("access key"))?;
        let secret_key = non_empty(config.secret_key.as_deref())
            .ok_or(StorageError::MissingCredential("secret key"))?;

        let endpoint = normalize_endpoint(endpoint);
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!(
            "S3 client configured for {} (bucket {}, region {})",
            endpoint, config.bucket, config.region
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            endpoint,
            verify_uploads: config.verify_uploads,
            multipart_threshold: config.multipart_threshold_bytes,
            part_size: config.multipart_part_size_bytes.max(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn put_single(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::backend("upload", key, e))?;

        let response = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => StorageError::backend("upload", key, err.into_err()),
                _ => StorageError::backend("upload", key, e),
            })?;

        if self.verify_uploads {
            let expected = file_md5(local_path).await?;
            let actual = response
                .e_tag()
                .map(|tag| tag.trim_matches('"').to_string())
                .unwrap_or_default();
            if !actual.eq_ignore_ascii_case(&expected) {
                return Err(StorageError::IntegrityMismatch {
                    key: key.to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Multipart upload; the upload is aborted when any part fails.
    async fn put_multipart(&self, local_path: &Path, key: &str, size: u64) -> Result<(), StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => StorageError::backend("upload", key, err.into_err()),
                _ => StorageError::backend("upload", key, e),
            })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::backend("upload", key, "no upload id returned"))?
            .to_string();

        let parts = match self.upload_parts(local_path, key, &upload_id, size).await {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                return Err(e);
            }
        };

        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;
        if let Err(e) = completed {
            self.abort_multipart(key, &upload_id).await;
            return Err(match e {
                SdkError::ServiceError(err) => StorageError::backend("upload", key, err.into_err()),
                _ => StorageError::backend("upload", key, e),
            });
        }
        Ok(())
    }

    async fn upload_parts(
        &self,
        local_path: &Path,
        key: &str,
        upload_id: &str,
        size: u64,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut file = tokio::fs::File::open(local_path).await?;
        let mut parts = Vec::new();
        let mut offset = 0u64;
        let mut part_number = 1i32;

        while offset < size {
            let len = self.part_size.min(size - offset);
            let mut buf = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buf).await?;

            let response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buf))
                .send()
                .await
                .map_err(|e| match e {
                    SdkError::ServiceError(err) => {
                        StorageError::backend("upload", key, err.into_err())
                    }
                    _ => StorageError::backend("upload", key, e),
                })?;

            debug!("Uploaded part {} of {} ({} bytes)", part_number, key, len);
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            offset += len;
            part_number += 1;
        }
        Ok(parts)
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!("Failed to abort multipart upload of {}: {}", key, e);
        }
    }

    async fn write_body(
        &self,
        key: &str,
        body: ByteStream,
        local_path: &Path,
    ) -> Result<u64, StorageError> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut reader = body.into_async_read();
        let mut file = tokio::fs::File::create(local_path).await?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::backend("download", key, e))?;
        file.sync_all().await?;
        Ok(written)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Adds `http://` when the endpoint carries no scheme.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

/// Hex MD5 of a local file, read in chunks.
async fn file_md5(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        context.consume(&buf[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &str {
        "s3"
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        let size = match tokio::fs::metadata(local_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                return Err(StorageError::SourceNotFound {
                    path: local_path.to_path_buf(),
                })
            }
        };

        if size > 0 && size >= self.multipart_threshold {
            self.put_multipart(local_path, key, size).await?;
        } else {
            self.put_single(local_path, key).await?;
        }

        info!(
            "Uploaded {} to s3://{}/{}",
            local_path.display(),
            self.bucket,
            key
        );
        Ok(())
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<u64, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) if err.err().is_no_such_key() => {
                    StorageError::NotFound {
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                    }
                }
                SdkError::ServiceError(err) => {
                    StorageError::backend("download", key, err.into_err())
                }
                _ => StorageError::backend("download", key, e),
            })?;

        match self.write_body(key, response.body, local_path).await {
            Ok(written) => {
                info!(
                    "Downloaded s3://{}/{} to {} ({} bytes)",
                    self.bucket,
                    key,
                    local_path.display(),
                    written
                );
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(local_path).await;
                Err(e)
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self.metadata(key).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!("Could not check s3://{}/{}: {}", self.bucket, key, e);
                false
            }
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| match e {
                SdkError::ServiceError(err) => StorageError::backend("list", prefix, err.into_err()),
                _ => StorageError::backend("list", prefix, e),
            })?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            continuation_token = response.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        debug!("Listed {} keys under s3://{}/{}", keys.len(), self.bucket, prefix);
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => StorageError::backend("delete", key, err.into_err()),
                _ => StorageError::backend("delete", key, e),
            })?;

        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        let response = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => return Ok(None),
            Err(e) => return Err(StorageError::backend("head", key, e)),
        };

        Ok(Some(ObjectMetadata {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            last_modified: response
                .last_modified()
                .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
            etag: response.e_tag().map(|tag| tag.trim_matches('"').to_string()),
            content_type: response.content_type().map(str::to_string),
        }))
    }

    async fn put_marker(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => StorageError::backend("upload", key, err.into_err()),
                _ => StorageError::backend("upload", key, e),
            })?;

        info!("Created folder s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
