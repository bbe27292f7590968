use super::{DeleteStatus, ObjectStore, StoredObject};
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::instrument;

/// S3 (or S3-compatible) object store
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    base_url: String,
}

fn storage_error(context: &str, err: impl std::error::Error) -> AppError {
    AppError::Storage {
        message: format!("{}: {}", context, DisplayErrorContext(err)),
    }
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, base_url: String) -> Self {
        Self { client, bucket, base_url }
    }

    /// Build a client from the default AWS credential chain
    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());

        let region = shared
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "us-east-1".to_string());

        Self::new(client, config.bucket.clone(), public_base_url(config, &region))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

/// Prefix under which uploaded keys are publicly addressable
fn public_base_url(config: &StorageConfig, region: &str) -> String {
    if let Some(base) = &config.public_base_url {
        return base.clone();
    }
    match &config.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", config.bucket, region),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, bytes: Bytes, key: &str, content_type: &str) -> Result<StoredObject> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| storage_error("failed to upload object", e))?;

        Ok(StoredObject {
            url: self.object_url(key),
            provider_id: key.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn fetch(&self, provider_id: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(provider_id)
            .send()
            .await
            .map_err(|e| storage_error("failed to fetch object", e))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| storage_error("failed to read object body", e))?;

        Ok(body.into_bytes())
    }

    #[instrument(skip(self))]
    async fn delete(&self, provider_id: &str) -> Result<DeleteStatus> {
        // S3 reports success for absent keys
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(provider_id)
            .send()
            .await
            .map_err(|e| storage_error("failed to delete object", e))?;

        Ok(DeleteStatus::Deleted)
    }

    fn provider(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_variants() {
        let mut config = StorageConfig::default();
        assert_eq!(
            public_base_url(&config, "eu-west-1"),
            "https://deepsearch.s3.eu-west-1.amazonaws.com"
        );

        config.endpoint = Some("http://localhost:9000/".into());
        assert_eq!(public_base_url(&config, "eu-west-1"), "http://localhost:9000/deepsearch");

        config.public_base_url = Some("https://cdn.example.com".into());
        assert_eq!(public_base_url(&config, "eu-west-1"), "https://cdn.example.com");
    }
}
