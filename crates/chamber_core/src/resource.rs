//! Asset lookup by logical path.
//!
//! Logical paths use `/` separators and may carry a leading `/`
//! (`/assets/player.png` and `assets/player.png` name the same asset).
//! Assets compiled into the binary win over files under the asset root.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource not found: {path}")]
    NotFound { path: String },
    #[error("failed to read resource {path}: {source}")]
    Io { path: String, source: io::Error },
}

pub struct ResourceLoader {
    root: PathBuf,
    bundled: HashMap<String, &'static [u8]>,
}

impl ResourceLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bundled: HashMap::new(),
        }
    }

    /// Registers bytes embedded in the binary (usually via `include_bytes!`).
    pub fn with_bundled(mut self, path: &str, bytes: &'static [u8]) -> Self {
        self.bundled.insert(normalize(path).to_string(), bytes);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let logical = normalize(path);
        if let Some(bytes) = self.bundled.get(logical) {
            log::debug!("Resource '{}' served from bundle ({} bytes)", logical, bytes.len());
            return Ok(bytes.to_vec());
        }

        let not_found = || ResourceError::NotFound {
            path: path.to_string(),
        };
        let relative = Path::new(logical);
        let escapes_root = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if logical.is_empty() || escapes_root {
            return Err(not_found());
        }

        let full = self.root.join(relative);
        match fs::read(&full) {
            Ok(bytes) => {
                log::debug!("Resource '{}' read from {}", logical, full.display());
                Ok(bytes)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(source) => Err(ResourceError::Io {
                path: path.to_string(),
                source,
            }),
        }
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}
