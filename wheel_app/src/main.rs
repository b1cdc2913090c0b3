//! The Wheel: spins a colored quad until the window closes or Escape is released
//!
//! Usage: `the_wheel [config.toml|config.ron]`

use wheel_engine::prelude::*;

fn main() {
    // Installed before the config is read so load errors are logged too
    logging::init("info");

    let loaded = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from_file(&path).map(|config| (config, Some(path))),
        None => Ok((EngineConfig::default(), None)),
    };

    let (config, source) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    logging::set_level(&config.log_level);
    match &source {
        Some(path) => log::info!("Starting The Wheel with config {}", path),
        None => log::info!("Starting The Wheel with default config"),
    }

    if let Err(e) = Engine::run(&config) {
        log::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
