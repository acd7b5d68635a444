//! Shared fakes for the unit tests.
//!
//! `MemoryBucket` stands in for the origin bucket, `CountingResizer` for the
//! image engine and `CountingCache` wraps a `MemoryCache` to count traffic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::cache::{CacheEntry, CacheError, CacheKey, CacheStore, MemoryCache};
use crate::images::{ResizeError, ResizeRequest, Resizer};
use crate::models::ListingEntry;
use crate::storage::{ObjectStore, StorageError, StoredObject};

// =========================================================================
// Object store
// =========================================================================

#[derive(Default)]
pub struct MemoryBucket {
    objects: Mutex<HashMap<String, (Bytes, String)>>,
    fail_listing: bool,
}

impl MemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_listing() -> Self {
        Self {
            fail_listing: true,
            ..Self::default()
        }
    }

    pub fn with_object(self, key: &str, bytes: impl Into<Bytes>, content_type: &str) -> Self {
        self.objects
            .lock()
            .insert(key.to_string(), (bytes.into(), content_type.to_string()));
        self
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryBucket {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StorageError> {
        self.objects
            .lock()
            .get(key)
            .map(|(bytes, content_type)| StoredObject {
                bytes: bytes.clone(),
                content_type: Some(content_type.clone()),
            })
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects
            .lock()
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<ListingEntry>, StorageError> {
        if self.fail_listing {
            return Err(StorageError::Status(503));
        }
        Ok(self
            .keys()
            .into_iter()
            .map(|key| {
                let size = self.objects.lock()[&key].0.len() as u64;
                ListingEntry::new(key, size)
            })
            .collect())
    }
}

// =========================================================================
// Resizer
// =========================================================================

/// Resizer stub that records every call and answers with
/// `"<key>:<width>x<height>"`.
#[derive(Default)]
pub struct CountingResizer {
    calls: AtomicUsize,
    requests: Mutex<Vec<ResizeRequest>>,
    failures_left: AtomicUsize,
    panics_left: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl CountingResizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `times` calls.
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Panics on the first `times` calls.
    pub fn panicking(times: usize) -> Self {
        Self {
            panics_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Holds every call until the gate hands out a permit.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self::new().with_gate(gate)
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ResizeRequest> {
        self.requests.lock().clone()
    }

    pub fn output_for(request: &ResizeRequest) -> Bytes {
        Bytes::from(format!(
            "{}:{}x{}",
            request.object_key, request.width, request.height
        ))
    }
}

#[async_trait]
impl Resizer for CountingResizer {
    async fn resize(&self, request: &ResizeRequest) -> Result<Bytes, ResizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| ResizeError::TaskFailed(e.to_string()))?;
        }

        let panics = self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if panics {
            panic!("resizer crashed on {}", request.object_key);
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ResizeError::ImageError("stub failure".to_string()));
        }

        Ok(Self::output_for(request))
    }
}

// =========================================================================
// Cache
// =========================================================================

#[derive(Default)]
pub struct CountingCache {
    inner: MemoryCache,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl CacheStore for CountingCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(entry).await
    }
}
