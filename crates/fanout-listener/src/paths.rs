//! File system paths for the listener.

use crate::error::{ListenerError, ListenerResult};
use std::path::{Path, PathBuf};

/// Directory under the home directory holding the config file.
const BASE_DIR_NAME: &str = ".fanout";

/// Manages file system paths for the listener.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.fanout)
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.fanout`.
    pub fn new() -> ListenerResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            ListenerError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the config file path (~/.fanout/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }
}
