use std::sync::Arc;

use log::info;

use crate::config::RoutingConfig;
use crate::images::path_extension;
use crate::models::ListingEntry;
use crate::storage::{ObjectStore, StorageError};

/// Lists the images available at the origin.
pub struct Catalog {
    store: Arc<dyn ObjectStore>,
    /// Prefix of objects that are not source images, e.g. cached renditions.
    hidden_prefix: Option<String>,
}

impl Catalog {
    pub fn new(store: Arc<dyn ObjectStore>, hidden_prefix: Option<String>) -> Self {
        Self {
            store,
            hidden_prefix: hidden_prefix.map(|p| format!("{}/", p.trim_matches('/'))),
        }
    }

    /// Every object with an allowed image extension, outside the hidden prefix.
    pub async fn list(&self, routing: &RoutingConfig) -> Result<Vec<ListingEntry>, StorageError> {
        let entries = self.store.list_objects().await?;
        let total = entries.len();

        let visible: Vec<ListingEntry> = entries
            .into_iter()
            .filter(|entry| !self.is_hidden(&entry.key))
            .filter(|entry| {
                path_extension(&entry.key).map_or(false, |ext| routing.is_allowed_extension(ext))
            })
            .collect();

        info!("Listing {} of {} objects", visible.len(), total);
        Ok(visible)
    }

    fn is_hidden(&self, key: &str) -> bool {
        self.hidden_prefix
            .as_deref()
            .map_or(false, |prefix| key.starts_with(prefix))
    }
}
