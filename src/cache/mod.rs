mod bucket;
mod disk;
mod memory;

pub use bucket::BucketCache;
pub use disk::DiskCache;
pub use memory::MemoryCache;

use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use thiserror::Error;

use crate::images::{path_extension, ImageFormat};
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Identifies one transformed image: the full request URL, scheme and host
/// included, so that any difference in path or query is a different entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_url(url: &Url) -> Self {
        Self(url.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex MD5 of the key, used where the key must become a file or object name.
    pub fn digest(&self) -> String {
        format!("{:x}", md5::compute(self.0.as_bytes()))
    }

    /// Image format named by the extension of the URL path.
    pub fn format(&self) -> Option<ImageFormat> {
        let url = Url::parse(&self.0).ok()?;
        path_extension(url.path()).and_then(ImageFormat::from_extension)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub bytes: Bytes,
    pub content_type: String,
}

/// Permanent store of transformed images. Entries are write-once: setting a
/// key that already has an entry keeps the existing one.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> CacheKey {
        CacheKey::from_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn keys_follow_the_full_url() {
        assert_eq!(
            key("http://edge.local/cat.jpg?w=200&h=100"),
            key("http://edge.local/cat.jpg?w=200&h=100")
        );
        assert_ne!(
            key("http://edge.local/cat.jpg?w=200&h=100"),
            key("http://edge.local/cat.jpg?w=201&h=100")
        );
        assert_ne!(
            key("http://edge.local/cat.jpg?w=200&h=100"),
            key("http://edge.local/cat.jpg?w=200&h=101")
        );
        assert_ne!(
            key("http://edge.local/cat.jpg"),
            key("http://other.local/cat.jpg")
        );
    }

    #[test]
    fn digest_is_stable_hex() {
        let digest = key("http://edge.local/cat.jpg").digest();
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, key("http://edge.local/cat.jpg").digest());
    }

    #[test]
    fn format_follows_the_path_extension() {
        assert_eq!(key("http://edge.local/cat.jpg?w=1").format(), Some(ImageFormat::Jpeg));
        assert_eq!(key("http://edge.local/a/dog.PNG").format(), Some(ImageFormat::Png));
        assert_eq!(key("http://edge.local/list").format(), None);
    }
}
