//! Multi-cloud storage abstraction.
//!
//! Provides a unified interface for writing sink output to S3, GCS, or the
//! local filesystem. Retry of transient failures is delegated to the
//! object_store client's own retry configuration; the sink core treats a
//! put as a blocking write that may fail.

mod url;

pub use url::{BackendConfig, GcsConfig, LocalConfig, S3Config};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload, RetryConfig};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{GcsConfigSnafu, ObjectStoreSnafu, S3ConfigSnafu, StorageError, StorageIoSnafu};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// The blob sink collaborator: maps a fully qualified object name to a
/// durable write.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` as the complete contents of the object at `path`.
    async fn put(&self, path: &str, data: Bytes) -> Result<(), StorageError>;
}

/// Storage provider that abstracts over different storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    config: BackendConfig,
    object_store: Arc<dyn ObjectStore>,
    canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

impl StorageProvider {
    /// Create a storage provider for the given destination URL.
    pub async fn for_url(url: &str) -> Result<Self, StorageError> {
        Self::for_url_with_options(url, HashMap::new()).await
    }

    /// Create a storage provider for the given destination URL with
    /// backend-specific options (credentials, region, endpoint, ...).
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;
        debug!(url = %url, config = ?config, "Creating storage provider");

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Gcs(config) => Self::construct_gcs(config, options),
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    fn construct_s3(
        config: S3Config,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
        for (key, value) in &options {
            builder = builder.with_config(key.parse().context(S3ConfigSnafu)?, value.clone());
        }
        builder = builder.with_retry(RetryConfig::default());

        let canonical_url = format!("s3://{}", config.bucket);
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(S3ConfigSnafu)?);

        Ok(Self {
            config: BackendConfig::S3(config),
            object_store,
            canonical_url,
        })
    }

    fn construct_gcs(
        config: GcsConfig,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);
        for (key, value) in &options {
            builder = builder.with_config(key.parse().context(GcsConfigSnafu)?, value.clone());
        }
        builder = builder.with_retry(RetryConfig::default());

        let canonical_url = format!("gs://{}", config.bucket);
        let object_store: Arc<dyn ObjectStore> =
            Arc::new(builder.build().context(GcsConfigSnafu)?);

        Ok(Self {
            config: BackendConfig::Gcs(config),
            object_store,
            canonical_url,
        })
    }

    async fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&config.path)
            .await
            .context(StorageIoSnafu)?;

        let object_store: Arc<dyn ObjectStore> =
            Arc::new(LocalFileSystem::new_with_prefix(&config.path).context(ObjectStoreSnafu)?);
        let canonical_url = format!("file://{}", config.path);

        Ok(Self {
            config: BackendConfig::Local(config),
            object_store,
            canonical_url,
        })
    }

    /// Get the contents of an object (used for verification and tests).
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let result = self
            .object_store
            .get(&self.qualify_path(&path.into()))
            .await
            .context(ObjectStoreSnafu)?;
        result.bytes().await.context(ObjectStoreSnafu)
    }

    /// Write the complete contents of an object.
    pub async fn put_bytes(&self, path: impl Into<Path>, data: Bytes) -> Result<(), StorageError> {
        self.object_store
            .put(&self.qualify_path(&path.into()), PutPayload::from(data))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// The canonical URL of this provider's root.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Qualify a relative path with the key prefix embedded in the URL.
    fn qualify_path(&self, path: &Path) -> Path {
        match self.config.key() {
            Some(key) => Path::from(format!("{key}/{path}")),
            None => path.clone(),
        }
    }
}

#[async_trait]
impl BlobStore for StorageProvider {
    async fn put(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        self.put_bytes(path, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let provider = StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        provider
            .put_bytes("nested/file.jsonl", Bytes::from("data"))
            .await
            .unwrap();

        let read_back = provider.get("nested/file.jsonl").await.unwrap();
        assert_eq!(read_back, Bytes::from("data"));

        // Written through to the real filesystem.
        assert!(temp_dir.path().join("nested/file.jsonl").exists());
    }

    #[tokio::test]
    async fn test_get_missing_object_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let provider = StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        let err = provider.get("absent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_blob_store_trait_object() {
        let temp_dir = TempDir::new().unwrap();
        let provider = StorageProvider::for_url(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();
        let store: Arc<dyn BlobStore> = Arc::new(provider);

        store.put("via-trait", Bytes::from("x")).await.unwrap();
        assert!(temp_dir.path().join("via-trait").exists());
    }
}
