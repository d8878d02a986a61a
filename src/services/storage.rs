use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Write-once durable store for scan images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `data` under `key`, returning a publicly resolvable URL. The
    /// OCR provider fetches the image from that URL.
    async fn put(&self, key: &str, data: &[u8], content_type: &str)
        -> Result<String, StorageError>;
}

/// S3-compatible object storage client (R2, MinIO, AWS).
pub struct S3Store {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl S3Store {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ImageStore for S3Store {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(format!("{}/{}", self.public_base_url, key))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("storage configuration error: {0}")]
    Config(String),
}
