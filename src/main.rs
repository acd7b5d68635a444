use std::process;

use dotenv::dotenv;
use env_logger::Env;
use log::{error, info};

use imgedge::config::{self, AppConfig};
use imgedge::Services;

#[rocket::main]
async fn main() {
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    // Load config
    let figment = config::figment();
    let config = match AppConfig::from_figment(&figment) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    info!("Configuration loaded successfully");

    // Storage client, cache and resizer are built once, before serving
    let services = match Services::from_config(&config) {
        Ok(services) => services,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    info!(
        "Default dimensions {}x{}, allowed extensions {:?}, cache backend {:?}",
        config.routing.default_width,
        config.routing.default_height,
        config.routing.allowed_extensions,
        config.cache.backend
    );
    info!("Starting imgedge on {}:{}", config.address, config.port);

    if let Err(e) = imgedge::build(figment, config.routing.clone(), services)
        .launch()
        .await
    {
        error!("Server failed: {}", e);
        process::exit(1);
    }
}
