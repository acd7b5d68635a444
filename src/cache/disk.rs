use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{CacheEntry, CacheError, CacheKey, CacheStore};

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    content_type: String,
}

/// Cache persisted in a local directory. Each entry is an `<md5>.bin` file with
/// the image and an `<md5>.json` file with its key and content type. The
/// metadata file is written last, so an entry only exists once it is complete.
pub struct DiskCache {
    directory: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskCache {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        info!("Disk cache initialized at {}", directory.display());

        Ok(Self {
            directory,
            temp_counter: AtomicU64::new(0),
        })
    }

    fn data_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(format!("{}.bin", key.digest()))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(format!("{}.json", key.digest()))
    }

    // Write to a sibling temp file then rename, so readers never see a partial file
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = path.with_extension(format!("{}.{}.tmp", std::process::id(), n));

        fs::write(&temp, contents).await?;
        if let Err(e) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStore for DiskCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let Some(raw_meta) = read_optional(&self.meta_path(key)).await? else {
            return Ok(None);
        };

        let meta: EntryMeta = serde_json::from_slice(&raw_meta)
            .map_err(|e| CacheError::Corrupt(format!("{}: {}", key, e)))?;

        if meta.key != key.as_str() {
            warn!(
                "Cache digest collision between {} and {}, treating as miss",
                key, meta.key
            );
            return Ok(None);
        }

        let Some(data) = read_optional(&self.data_path(key)).await? else {
            return Err(CacheError::Corrupt(format!("{}: data file missing", key)));
        };

        Ok(Some(CacheEntry {
            key: key.clone(),
            bytes: Bytes::from(data),
            content_type: meta.content_type,
        }))
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let meta_path = self.meta_path(&entry.key);
        if fs::metadata(&meta_path).await.is_ok() {
            debug!("Cache entry for {} already present, keeping it", entry.key);
            return Ok(());
        }

        let meta = serde_json::to_vec(&EntryMeta {
            key: entry.key.as_str().to_string(),
            content_type: entry.content_type,
        })
        .map_err(|e| CacheError::Corrupt(e.to_string()))?;

        self.write_atomic(&self.data_path(&entry.key), &entry.bytes)
            .await?;
        self.write_atomic(&meta_path, &meta).await?;

        debug!("Cached {} bytes for {}", entry.bytes.len(), entry.key);
        Ok(())
    }
}
