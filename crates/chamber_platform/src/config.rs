//! Window configuration with an optional JSON override file.
//!
//! Every field falls back to its default, so a partial file such as
//! `{ "width": 1024 }` only changes what it names.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    /// Present with vertical sync (FIFO). Off selects a non-blocking mode.
    pub vsync: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Chamber 1".to_string(),
            width: 800,
            height: 600,
            resizable: true,
            vsync: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("config {}: window size must be non-zero, got {width}x{height}", path.display())]
    ZeroSize {
        path: PathBuf,
        width: u32,
        height: u32,
    },
}

/// Loads `path` if it exists, otherwise returns the defaults.
pub fn load_platform_config(path: &Path) -> Result<PlatformConfig, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(PlatformConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config: PlatformConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if config.width == 0 || config.height == 0 {
        return Err(ConfigError::ZeroSize {
            path: path.to_path_buf(),
            width: config.width,
            height: config.height,
        });
    }

    log::info!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "chamber_config_test_{}_{}_{}.json",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = temp_file_path("missing");
        let config = load_platform_config(&path).expect("missing file is not an error");
        assert_eq!(config, PlatformConfig::default());
        assert_eq!(config.title, "Chamber 1");
        assert_eq!((config.width, config.height), (800, 600));
    }

    #[test]
    fn partial_file_overrides_named_fields_only() {
        let path = temp_file_path("partial");
        fs::write(&path, r#"{ "width": 1024, "vsync": false }"#).expect("write temp config");

        let config = load_platform_config(&path).expect("config should load");
        assert_eq!(config.width, 1024);
        assert_eq!(config.height, 600);
        assert!(!config.vsync);
        assert!(config.resizable);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let path = temp_file_path("malformed");
        fs::write(&path, "{ width: ").expect("write temp config");

        let err = load_platform_config(&path).expect_err("malformed config must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let path = temp_file_path("unknown");
        fs::write(&path, r#"{ "fullscreen": true }"#).expect("write temp config");

        let err = load_platform_config(&path).expect_err("unknown field must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let path = temp_file_path("zero");
        fs::write(&path, r#"{ "height": 0 }"#).expect("write temp config");

        let err = load_platform_config(&path).expect_err("zero height must fail");
        assert!(matches!(err, ConfigError::ZeroSize { height: 0, .. }));

        let _ = fs::remove_file(&path);
    }
}
