use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::images::{ResizeError, ResizeRequest, Resizer};

type SharedResize = Shared<BoxFuture<'static, Result<Bytes, ResizeError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResizedImage {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub cache: CacheStatus,
}

/// Serves resize requests from the cache, resizing and caching on a miss.
///
/// Concurrent misses for the same key share a single resize: the first caller
/// starts it as a detached task and later callers await the same result. The
/// task runs to completion even if every caller goes away, so the cache is
/// still filled after a client disconnect.
pub struct ResizeOrchestrator {
    resizer: Arc<dyn Resizer>,
    cache: Arc<dyn CacheStore>,
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedResize>>>,
}

impl ResizeOrchestrator {
    pub fn new(resizer: Arc<dyn Resizer>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            resizer,
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn serve(
        &self,
        key: CacheKey,
        request: ResizeRequest,
    ) -> Result<ResizedImage, ResizeError> {
        let content_type = request.format.mime();

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                info!("Cache hit: {}", key);
                return Ok(ResizedImage {
                    bytes: entry.bytes,
                    content_type,
                    cache: CacheStatus::Hit,
                });
            }
            Ok(None) => info!("Cache miss: {}", key),
            Err(e) => warn!("Cache read failed for {}, treating as miss: {}", key, e),
        }

        let bytes = self.join_or_start(key, request).await?;

        Ok(ResizedImage {
            bytes,
            content_type,
            cache: CacheStatus::Miss,
        })
    }

    /// Number of resizes currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn join_or_start(&self, key: CacheKey, request: ResizeRequest) -> SharedResize {
        let mut in_flight = self.in_flight.lock();

        if let Some(existing) = in_flight.get(&key) {
            debug!("Joining in-flight resize for {}", key);
            return existing.clone();
        }

        // The task removes its own entry, which it cannot do before we release the lock
        let task = tokio::spawn(resize_and_store(
            self.resizer.clone(),
            self.cache.clone(),
            self.in_flight.clone(),
            key.clone(),
            request,
        ));

        let shared = async move {
            task.await
                .unwrap_or_else(|e| Err(ResizeError::TaskFailed(e.to_string())))
        }
        .boxed()
        .shared();

        in_flight.insert(key, shared.clone());
        shared
    }
}

// Unregisters a resize when its task ends, including by panic
struct InFlightGuard {
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedResize>>>,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

async fn resize_and_store(
    resizer: Arc<dyn Resizer>,
    cache: Arc<dyn CacheStore>,
    in_flight: Arc<Mutex<HashMap<CacheKey, SharedResize>>>,
    key: CacheKey,
    request: ResizeRequest,
) -> Result<Bytes, ResizeError> {
    let _guard = InFlightGuard {
        in_flight,
        key: key.clone(),
    };
    resize_once(resizer.as_ref(), cache.as_ref(), &key, &request).await
}

async fn resize_once(
    resizer: &dyn Resizer,
    cache: &dyn CacheStore,
    key: &CacheKey,
    request: &ResizeRequest,
) -> Result<Bytes, ResizeError> {
    // A resize for this key may have finished between the caller's cache read
    // and the registration of this task.
    if let Ok(Some(entry)) = cache.get(key).await {
        debug!("Cache filled while waiting: {}", key);
        return Ok(entry.bytes);
    }

    let bytes = match resizer.resize(request).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Resize failed for {}: {}", key, e);
            return Err(e);
        }
    };

    let entry = CacheEntry {
        key: key.clone(),
        bytes: bytes.clone(),
        content_type: request.format.mime().to_string(),
    };
    match cache.set(entry).await {
        Ok(()) => info!("Cached {} ({} bytes)", key, bytes.len()),
        Err(e) => warn!("Cache write failed for {}: {}", key, e),
    }

    Ok(bytes)
}
