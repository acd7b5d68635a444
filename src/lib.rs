#[macro_use]
extern crate rocket;

pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod images;
pub mod models;
pub mod orchestrator;
pub mod routing;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use log::info;
use rocket::figment::Figment;
use rocket::{Build, Rocket};

use cache::{BucketCache, CacheStore, DiskCache, MemoryCache};
use catalog::Catalog;
use config::{AppConfig, CacheBackend, RoutingConfig, StartupError};
use images::ImageResizer;
use orchestrator::ResizeOrchestrator;
use storage::{BucketClient, ObjectStore};

/// Collaborators shared by every request, built once before the server starts.
pub struct Services {
    pub orchestrator: ResizeOrchestrator,
    pub catalog: Catalog,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let credentials = config.credentials()?;
        let bucket: Arc<dyn ObjectStore> = Arc::new(BucketClient::new(
            &config.storage,
            &credentials,
            config.timeout,
        )?);

        let (cache, hidden_prefix): (Arc<dyn CacheStore>, Option<String>) =
            match config.cache.backend {
                CacheBackend::Memory => {
                    info!("Image cache kept in memory");
                    (Arc::new(MemoryCache::new()), None)
                }
                CacheBackend::Disk => (Arc::new(DiskCache::new(&config.cache.directory)?), None),
                CacheBackend::Bucket => {
                    let cache = BucketCache::new(bucket.clone(), config.cache.prefix.clone());
                    info!("Image cache kept in the bucket under '{}/'", cache.prefix());
                    let prefix = cache.prefix().to_string();
                    (Arc::new(cache), Some(prefix))
                }
            };

        let resizer = Arc::new(ImageResizer::new(bucket.clone(), config.resize.jpeg_quality));

        Ok(Self {
            orchestrator: ResizeOrchestrator::new(resizer, cache),
            catalog: Catalog::new(bucket, hidden_prefix),
        })
    }
}

/// Assembles the Rocket instance around already constructed services.
pub fn build(figment: Figment, routing: RoutingConfig, services: Services) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(routing)
        .manage(services.orchestrator)
        .manage(services.catalog)
        .mount("/", routes![api::images::dispatch])
}
