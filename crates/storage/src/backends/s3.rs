//! S3-compatible storage backend using the AWS SDK.
//!
//! Uploads use multipart with a bounded pool of in-flight parts, so a large
//! mirror transfer keeps the network busy without buffering the whole file.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, StreamingUpload};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Part size for multipart uploads (5 MiB, the S3 minimum for non-final parts).
const PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum parts uploading concurrently per file.
const MAX_IN_FLIGHT_PARTS: usize = 10;

/// Attempts per part before the upload fails.
const PART_RETRY_ATTEMPTS: u32 = 3;

fn map_s3_operation_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::S3(Box::new(err))
}

/// S3-compatible object store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `force_path_style` - Use path-style URLs (`endpoint/bucket/key`)
    ///   instead of virtual-hosted style. Required for MinIO and some
    ///   S3-compatible services.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() ^ secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region.clone()));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials =
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "depot-config");
            builder = builder.credentials_provider(credentials);
        } else {
            let chain = aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(aws_config::Region::new(resolved_region.clone()))
                .build()
                .await;
            builder = builder.credentials_provider(chain);
        }

        if let Some(endpoint_url) = endpoint {
            // Handle bare host:port endpoints (e.g., "minio:9000").
            let endpoint_lower = endpoint_url.to_lowercase();
            let normalized = if endpoint_lower.starts_with("http://")
                || endpoint_lower.starts_with("https://")
            {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            };
            builder = builder.endpoint_url(normalized);
        }

        if force_path_style {
            builder = builder.force_path_style(true);
        }

        // Strip trailing slashes so keys never contain "prefix//key".
        let normalized_prefix = prefix.map(|p| p.trim_end_matches('/').to_string());

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix: normalized_prefix,
        })
    }

    /// Get the full object key (applies prefix if configured).
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
            if service_err.raw().status().as_u16() == 404 {
                return StorageError::NotFound(key.to_string());
            }
        }
        map_s3_operation_error(err)
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
                    if service_err.raw().status().as_u16() == 404 {
                        return Ok(false);
                    }
                }
                Err(map_s3_operation_error(err))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let last_modified = output
            .last_modified()
            .and_then(|dt| time::OffsetDateTime::from_unix_timestamp(dt.secs()).ok());

        Ok(ObjectMeta {
            size: output.content_length().unwrap_or(0) as u64,
            last_modified,
            content_type: output.content_type().map(|s| s.to_string()),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let full_key = self.full_key(key);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let reader_stream = ReaderStream::new(output.body.into_async_read());
        Ok(Box::pin(
            reader_stream.map(|result| result.map_err(StorageError::Io)),
        ))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let full_key = self.full_key(key);
        let create_output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        let upload_id = create_output
            .upload_id()
            .ok_or_else(|| StorageError::Config("S3 did not return upload_id".to_string()))?
            .to_string();

        Ok(Box::new(S3Upload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: full_key,
            upload_id,
            buffer: Vec::with_capacity(PART_SIZE),
            next_part_number: 1,
            bytes_written: 0,
            in_flight: FuturesUnordered::new(),
            completed: Vec::new(),
        }))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        // delete_object does not error on missing keys, so head first to
        // report NotFound consistently with the filesystem backend.
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let full_key = self.full_key(key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let marker_key = self.full_key(".depot-health-check");
        let check = async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .body(Bytes::from_static(b"health-check").into())
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            if let Err(e) = self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(&marker_key)
                .send()
                .await
            {
                return Err(map_s3_operation_error(e));
            }
            Ok(())
        };

        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check)
            .await
            .map_err(|_| {
                StorageError::Config("S3 health check timed out after 10s".to_string())
            })?
    }
}

/// Upload a single part with bounded retries.
async fn upload_part_with_retry(
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    part_number: i32,
    data: Bytes,
) -> StorageResult<CompletedPart> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client
            .upload_part()
            .bucket(&bucket)
            .key(&key)
            .upload_id(&upload_id)
            .part_number(part_number)
            .body(data.clone().into())
            .send()
            .await
        {
            Ok(output) => {
                return Ok(CompletedPart::builder()
                    .e_tag(output.e_tag().unwrap_or_default())
                    .part_number(part_number)
                    .build());
            }
            Err(e) if attempt < PART_RETRY_ATTEMPTS => {
                tracing::warn!(
                    key = %key,
                    part_number,
                    attempt,
                    error = %e,
                    "part upload failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
            Err(e) => return Err(map_s3_operation_error(e)),
        }
    }
}

struct S3Upload {
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    /// Accumulates data until a full part is available.
    buffer: Vec<u8>,
    next_part_number: i32,
    bytes_written: u64,
    /// Parts currently uploading. Bounded at MAX_IN_FLIGHT_PARTS.
    in_flight: FuturesUnordered<JoinHandle<StorageResult<CompletedPart>>>,
    completed: Vec<CompletedPart>,
}

impl S3Upload {
    /// Start uploading one part, waiting for a slot if the pool is full.
    async fn spawn_part(&mut self, data: Vec<u8>) -> StorageResult<()> {
        while self.in_flight.len() >= MAX_IN_FLIGHT_PARTS {
            self.collect_one().await?;
        }

        let part_number = self.next_part_number;
        self.next_part_number += 1;
        self.in_flight.push(tokio::spawn(upload_part_with_retry(
            self.client.clone(),
            self.bucket.clone(),
            self.key.clone(),
            self.upload_id.clone(),
            part_number,
            Bytes::from(data),
        )));
        Ok(())
    }

    /// Wait for one in-flight part to complete.
    async fn collect_one(&mut self) -> StorageResult<()> {
        if let Some(joined) = self.in_flight.next().await {
            let part = joined
                .map_err(|e| StorageError::Upload(format!("part upload task failed: {e}")))??;
            self.completed.push(part);
        }
        Ok(())
    }

    async fn abort_upload(&self) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(map_s3_operation_error)?;
        Ok(())
    }
}

#[async_trait]
impl StreamingUpload for S3Upload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.bytes_written += data.len() as u64;
        self.buffer.extend_from_slice(&data);

        while self.buffer.len() >= PART_SIZE {
            let part: Vec<u8> = self.buffer.drain(..PART_SIZE).collect();
            self.spawn_part(part).await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.spawn_part(rest).await?;
        }

        while !self.in_flight.is_empty() {
            self.collect_one().await?;
        }

        // Zero-byte uploads: multipart requires at least one part, so fall
        // back to a plain PutObject for empty files.
        if self.completed.is_empty() {
            if let Err(e) = self.abort_upload().await {
                tracing::warn!(
                    key = %self.key,
                    upload_id = %self.upload_id,
                    error = %e,
                    "failed to abort empty multipart upload, orphaned parts may remain"
                );
            }

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(Bytes::new().into())
                .send()
                .await
                .map_err(map_s3_operation_error)?;

            return Ok(self.bytes_written);
        }

        // Parts finish out of order; S3 requires them sorted.
        self.completed.sort_by_key(|p| p.part_number());

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(self.completed.clone()))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(map_s3_operation_error)?;

        Ok(self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        // In-flight part tasks are left to finish on their own; the abort
        // removes everything they uploaded.
        self.abort_upload().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_backend(prefix: Option<String>) -> S3Backend {
        S3Backend::new(
            "test-bucket",
            Some("http://localhost:9000".to_string()),
            Some("us-east-1".to_string()),
            prefix,
            Some("test-key".to_string()),
            Some("test-secret".to_string()),
            true,
        )
        .await
        .expect("backend construction should not require connectivity")
    }

    #[tokio::test]
    async fn full_key_applies_prefix() {
        let backend = make_backend(Some("mirror/".to_string())).await;
        assert_eq!(backend.full_key("mods/1/a.zip"), "mirror/mods/1/a.zip");

        let backend = make_backend(None).await;
        assert_eq!(backend.full_key("mods/1/a.zip"), "mods/1/a.zip");
    }

    #[tokio::test]
    async fn unpaired_credentials_are_rejected() {
        let result = S3Backend::new(
            "test-bucket",
            None,
            None,
            None,
            Some("key-only".to_string()),
            None,
            false,
        )
        .await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }

    #[tokio::test]
    async fn bare_endpoint_gets_http_scheme() {
        // Construction succeeds with a bare host:port endpoint.
        S3Backend::new(
            "test-bucket",
            Some("minio:9000".to_string()),
            None,
            None,
            Some("test-key".to_string()),
            Some("test-secret".to_string()),
            true,
        )
        .await
        .expect("bare endpoint accepted");
    }
}
