use std::time::Duration;

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::config::StorageConfig;

/// Where the original uploads behind OCR records are archived.
#[async_trait]
pub trait InputStore: Send + Sync {
    async fn save(&self, key: &str, image: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
    async fn link(&self, key: &str, ttl: Duration) -> anyhow::Result<String>;
}

/// S3-compatible bucket, in practice MinIO.
#[derive(Clone)]
pub struct MinioInputStore {
    s3: Client,
    bucket: String,
}

impl MinioInputStore {
    pub async fn connect(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "env");
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        // MinIO only understands path-style addressing
        let s3_conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            s3: Client::from_conf(s3_conf),
            bucket: cfg.bucket.clone(),
        })
    }

    /// Creates the bucket on first start against a fresh MinIO.
    pub async fn ensure_bucket(&self) -> anyhow::Result<()> {
        let exists = self.s3.head_bucket().bucket(&self.bucket).send().await.is_ok();
        if exists {
            return Ok(());
        }
        self.s3
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .with_context(|| format!("create bucket {}", self.bucket))?;
        info!(bucket = %self.bucket, "bucket created");
        Ok(())
    }
}

#[async_trait]
impl InputStore for MinioInputStore {
    async fn save(&self, key: &str, image: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = image.len();
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(image))
            .send()
            .await
            .with_context(|| format!("store input {}", key))?;
        debug!(key, size, "input stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("remove input {}", key))?;
        Ok(())
    }

    async fn link(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
        let presigning = PresigningConfig::expires_in(ttl).context("presign ttl")?;
        let req = self
            .s3
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| format!("presign input {}", key))?;
        Ok(req.uri().to_string())
    }
}
