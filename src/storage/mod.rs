mod bucket;

pub use bucket::BucketClient;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::models::ListingEntry;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Storage responded with status {0}")]
    Status(u16),

    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),
}

/// An object fetched from the origin bucket.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Bucket-style object storage used as the image origin.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StorageError>;

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Enumerates every object in the bucket.
    async fn list_objects(&self) -> Result<Vec<ListingEntry>, StorageError>;
}
