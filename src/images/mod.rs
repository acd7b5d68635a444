mod format;
mod resizer;

pub use format::{path_extension, ImageFormat, ResizeRequest};
pub use resizer::ImageResizer;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::storage::StorageError;

// Cloneable so one result can be handed to every request waiting on the same resize
#[derive(Error, Debug, Clone)]
pub enum ResizeError {
    #[error("Source image not found: {0}")]
    ObjectNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Resize task failed: {0}")]
    TaskFailed(String),
}

impl From<StorageError> for ResizeError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { key } => ResizeError::ObjectNotFound(key),
            other => ResizeError::StorageError(other.to_string()),
        }
    }
}

/// Produces the encoded bytes of a resized image.
#[async_trait]
pub trait Resizer: Send + Sync {
    async fn resize(&self, request: &ResizeRequest) -> Result<Bytes, ResizeError>;
}
