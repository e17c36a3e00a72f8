pub mod config;
pub mod errors;
pub mod logging;

pub use config::{AppConfig, ConfigError, ConfigResult, ConfigValidator};
pub use errors::*;
pub use logging::init_logging;
