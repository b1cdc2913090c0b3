//! Logging utilities and structured logging support
//!
//! The logger is installed before configuration is read, so config errors
//! are logged like everything else. Once the config is loaded its level is
//! applied with [`set_level`].

pub use log::{debug, error, info, trace, warn};

use log::LevelFilter;

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `default_level` and over any later
/// [`set_level`]. Calling this more than once is harmless; later calls keep
/// the first logger.
pub fn init(default_level: &str) {
    if rust_log_set() {
        if env_logger::Builder::from_default_env().try_init().is_err() {
            log::debug!("Logger already initialized");
        }
        return;
    }

    // env_logger lets everything through; the global max level does the filtering
    if env_logger::Builder::new().filter_level(LevelFilter::Trace).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
    set_level(default_level);
}

/// Change the global level after [`init`]
///
/// Returns false when `RUST_LOG` is in charge or `level` is not a level name.
pub fn set_level(level: &str) -> bool {
    if rust_log_set() {
        return false;
    }
    match parse_level(level) {
        Some(filter) => {
            log::set_max_level(filter);
            true
        }
        None => {
            log::warn!("Unknown log level '{}', keeping {}", level, log::max_level());
            false
        }
    }
}

/// Level name as accepted in config files (`off`, `error` .. `trace`)
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    level.trim().parse().ok()
}

fn rust_log_set() -> bool {
    std::env::var_os(env_logger::DEFAULT_FILTER_ENV).is_some()
}
