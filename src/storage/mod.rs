//! Object storage for uploaded video copies
//! Uses Apache Arrow object_store crate

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::signer::Signer;
use object_store::{ObjectStore, WriteMultipart, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::config::{StorageConfig, StorageProvider};

/// Size of the parts streamed to the store
const PART_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Operations the processing pipeline needs from object storage
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Streams a local file to `key`.
    async fn put_file(&self, key: &str, local: &Path) -> Result<UploadMetadata>;

    /// Time-limited GET URL for `key`.
    async fn sign_url(&self, key: &str, ttl: Duration) -> Result<String>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self {
            store,
            signer: None,
            bucket,
        }
    }

    /// Create in-memory storage for testing/development
    ///
    /// Signed URLs take the form `memory://{bucket}/{key}`.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(object_store::memory::InMemory::new()),
            "vidscribe-local".to_string(),
        )
    }

    /// S3-compatible backend (AWS, Aliyun OSS, MinIO)
    pub fn s3(config: &StorageConfig) -> Result<Self> {
        let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) else {
            return Err(StorageError::Config("missing access key credentials".to_string()));
        };

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .with_virtual_hosted_style_request(config.virtual_hosted_style);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let s3 = Arc::new(builder.build()?);
        tracing::info!(bucket = %config.bucket, endpoint = ?config.endpoint, "S3 storage configured");

        Ok(Self {
            store: s3.clone(),
            signer: Some(s3),
            bucket: config.bucket.clone(),
        })
    }

    /// Builds the backend selected in configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::S3 => Self::s3(config),
            StorageProvider::Memory => {
                let mut client = Self::in_memory();
                client.bucket = config.bucket.clone();
                Ok(client)
            }
        }
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStorage for StorageClient {
    async fn put_file(&self, key: &str, local: &Path) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let mut file = tokio::fs::File::open(local).await?;

        let upload = self.store.put_multipart(&path).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, PART_SIZE);
        let mut buf = vec![0u8; PART_SIZE];
        let mut size = 0usize;

        loop {
            let n = match file.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(4).await {
                let _ = writer.abort().await;
                return Err(StorageError::UploadFailed(e.to_string()));
            }
            writer.write(&buf[..n]);
            size += n;
        }

        let put_result = writer
            .finish()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        tracing::info!(key, size, "Uploaded to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag,
            size,
        })
    }

    async fn sign_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let path = StoragePath::from(key);

        match &self.signer {
            Some(signer) => {
                let url = signer
                    .signed_url(reqwest::Method::GET, &path, ttl)
                    .await
                    .map_err(|e| StorageError::SigningFailed(e.to_string()))?;
                Ok(url.to_string())
            }
            None => {
                if !self.exists(key).await? {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                Ok(format!("memory://{}/{}", self.bucket, path))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = StoragePath::from(key);
        self.store.delete(&path).await?;
        tracing::info!(key, "Deleted from storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_file_and_sign() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("clip.mp4");
        std::fs::write(&local, b"not really a video").unwrap();

        let client = StorageClient::in_memory();
        let meta = client.put_file("videos/abc.mp4", &local).await.unwrap();
        assert_eq!(meta.size, 18);
        assert_eq!(client.download("videos/abc.mp4").await.unwrap(), b"not really a video");

        let url = client
            .sign_url("videos/abc.mp4", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "memory://vidscribe-local/videos/abc.mp4");
    }

    #[tokio::test]
    async fn test_sign_missing_key() {
        let client = StorageClient::in_memory();
        let err = client
            .sign_url("videos/missing.mp4", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("clip.mp4");
        std::fs::write(&local, b"data").unwrap();

        let client = StorageClient::in_memory();
        client.put_file("videos/x.mp4", &local).await.unwrap();
        assert!(client.exists("videos/x.mp4").await.unwrap());

        client.delete("videos/x.mp4").await.unwrap();
        assert!(!client.exists("videos/x.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_missing_file() {
        let client = StorageClient::in_memory();
        let err = client
            .put_file("videos/x.mp4", Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_s3_requires_credentials() {
        let config = StorageConfig {
            provider: StorageProvider::S3,
            ..StorageConfig::default()
        };
        assert!(matches!(
            StorageClient::from_config(&config),
            Err(StorageError::Config(_))
        ));
    }
}
