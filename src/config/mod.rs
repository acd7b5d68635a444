use std::env;
use std::path::PathBuf;

use rocket::figment::{
    providers::{Env, Format, Toml},
    Figment, Profile,
};
use serde::Deserialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::images::ImageFormat;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(#[from] rocket::figment::Error),

    #[error("Invalid routing configuration: {0}")]
    Routing(String),

    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache setup failed: {0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub address: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    pub storage: StorageConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub resize: ResizeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub spaces_key: Option<String>,
    pub spaces_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    /// CDN domain that replaces the endpoint host on every signed request.
    pub host_rewrite: Option<String>,
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub path_style: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path serving the bucket listing. `None` or an empty string disables it.
    pub listing_route: Option<String>,
    pub allowed_extensions: Vec<String>,
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            listing_route: Some("/list".to_string()),
            allowed_extensions: vec!["jpg".to_string(), "png".to_string()],
            default_width: 500,
            default_height: 500,
        }
    }
}

impl RoutingConfig {
    pub fn listing_route(&self) -> Option<&str> {
        self.listing_route.as_deref().filter(|route| !route.is_empty())
    }

    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    fn validate(&self) -> Result<(), StartupError> {
        if let Some(route) = self.listing_route() {
            if !route.starts_with('/') {
                return Err(StartupError::Routing(format!(
                    "listing route '{}' must start with '/'",
                    route
                )));
            }
        }
        if let Some(ext) = self
            .allowed_extensions
            .iter()
            .find(|ext| ImageFormat::from_extension(ext).is_none())
        {
            return Err(StartupError::Routing(format!(
                "extension '{}' is not a supported image format",
                ext
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResizeConfig {
    pub jpeg_quality: u8,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self { jpeg_quality: 85 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Disk,
    Bucket,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Directory of the disk backend.
    pub directory: PathBuf,
    /// Key prefix of the bucket backend.
    pub prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Disk,
            directory: PathBuf::from("cache"),
            prefix: "cache".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub access_key: String,
    pub secret_key: String,
}

fn default_timeout() -> u64 {
    30
}

/// Builds the layered configuration: Rocket defaults, `App.toml` profiles,
/// `IMGEDGE_` prefixed variables and the storage credentials.
pub fn figment() -> Figment {
    let mut figment = Figment::from(rocket::Config::default())
        .merge(Toml::file("App.toml").nested())
        .merge(Env::prefixed("IMGEDGE_").split("__").global());

    if let Ok(key) = env::var("SPACES_KEY") {
        figment = figment.merge(("spaces_key", key));
    }

    if let Ok(secret) = env::var("SPACES_SECRET") {
        figment = figment.merge(("spaces_secret", secret));
    }

    figment.select(Profile::from_env_or("APP_PROFILE", "default"))
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, StartupError> {
        let config = figment.extract::<AppConfig>()?;
        config.routing.validate()?;
        Ok(config)
    }

    pub fn credentials(&self) -> Result<StorageCredentials, StartupError> {
        let access_key = non_empty(&self.spaces_key)
            .ok_or(StartupError::MissingCredential("SPACES_KEY"))?;
        let secret_key = non_empty(&self.spaces_secret)
            .ok_or(StartupError::MissingCredential("SPACES_SECRET"))?;

        Ok(StorageCredentials {
            access_key,
            secret_key,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
