pub mod config;
pub mod window;

pub use config::{load_platform_config, ConfigError, PlatformConfig};
