use crate::{domain::MediaStorage, errors::StorageError};
use async_trait::async_trait;
use aws_sdk_s3::{Client as S3Client, primitives::ByteStream};
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::debug;

/// S3-backed media storage. Uploaded objects are served from a public base
/// URL (a CDN in production, the bucket URL otherwise).
#[derive(Debug, Clone)]
pub struct S3MediaStorage {
    client: S3Client,
    bucket_name: String,
    region: String,
    public_base_url: Option<String>,
}

impl S3MediaStorage {
    pub fn new(
        client: S3Client,
        bucket_name: String,
        region: String,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            bucket_name,
            region,
            public_base_url,
        }
    }

    fn public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket_name, self.region, key
            ),
        }
    }

    fn retry_policy() -> ExponentialBackoff {
        ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(15)),
            ..ExponentialBackoff::default()
        }
    }
}

#[async_trait]
impl MediaStorage for S3MediaStorage {
    /// Uploads with PutObject, retrying transient failures with exponential
    /// backoff. Returns the public URL the object is served from.
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, StorageError> {
        let content_type =
            content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        debug!(s3_key = %key, bucket = %self.bucket_name, %content_type, "S3: Uploading media");

        backoff::future::retry(Self::retry_policy(), || async {
            self.client
                .put_object()
                .bucket(&self.bucket_name)
                .key(key)
                .body(ByteStream::from(data.clone()))
                .content_type(&content_type)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(anyhow::Error::new(e)))?;
            Ok(())
        })
        .await
        .map_err(|e: anyhow::Error| {
            StorageError::UploadFailed(format!(
                "S3: Failed to upload object with key '{}': {}",
                key, e
            ))
        })?;

        debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(self.public_url(key))
    }

    /// Deletes an object. DeleteObject succeeds even when the object is
    /// already gone, so only genuine backend errors surface.
    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Deleting object");
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                StorageError::BackendError(
                    anyhow::Error::new(sdk_err)
                        .context(format!("S3: Failed to delete object with key '{}'", key)),
                )
            })?;
        Ok(())
    }
}
