use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CacheEntry, CacheError, CacheKey, CacheStore};

// Transformed images kept in memory for the lifetime of the process
pub struct MemoryCache {
    images: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            images: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.read().is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let images = self.images.read();
        Ok(images.get(key).cloned())
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let mut images = self.images.write();
        images.entry(entry.key.clone()).or_insert(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use reqwest::Url;

    use super::*;

    fn entry(bytes: &'static [u8]) -> CacheEntry {
        CacheEntry {
            key: CacheKey::from_url(&Url::parse("http://edge.local/cat.jpg?w=10").unwrap()),
            bytes: Bytes::from_static(bytes),
            content_type: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn stores_and_returns_entries() {
        let cache = MemoryCache::new();
        let first = entry(b"first");

        assert!(cache.get(&first.key).await.unwrap().is_none());
        cache.set(first.clone()).await.unwrap();

        assert_eq!(cache.get(&first.key).await.unwrap(), Some(first));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn entries_are_never_overwritten() {
        let cache = MemoryCache::new();
        cache.set(entry(b"first")).await.unwrap();
        cache.set(entry(b"second")).await.unwrap();

        let stored = cache.get(&entry(b"").key).await.unwrap().unwrap();
        assert_eq!(stored.bytes, Bytes::from_static(b"first"));
    }
}
