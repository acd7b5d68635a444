use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::{CacheEntry, CacheError, CacheKey, CacheStore};
use crate::storage::{ObjectStore, StorageError};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Cache kept in the origin bucket itself, under `<prefix>/<md5 of key>.<ext>`.
/// Objects are never replaced once written.
pub struct BucketCache {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl BucketCache {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn object_name(&self, key: &CacheKey) -> String {
        match key.format() {
            Some(format) => format!("{}/{}.{}", self.prefix, key.digest(), format.extension()),
            None => format!("{}/{}", self.prefix, key.digest()),
        }
    }
}

#[async_trait]
impl CacheStore for BucketCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        match self.store.get_object(&self.object_name(key)).await {
            Ok(object) => Ok(Some(CacheEntry {
                key: key.clone(),
                bytes: object.bytes,
                content_type: object.content_type.unwrap_or_else(|| {
                    key.format()
                        .map_or(FALLBACK_CONTENT_TYPE, |format| format.mime())
                        .to_string()
                }),
            })),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let name = self.object_name(&entry.key);
        match self.store.get_object(&name).await {
            Ok(_) => {
                debug!("Cache object {} already present, keeping it", name);
                return Ok(());
            }
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        debug!("Storing cache object {} for {}", name, entry.key);
        self.store
            .put_object(&name, entry.bytes, &entry.content_type)
            .await?;
        Ok(())
    }
}
