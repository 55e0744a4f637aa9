//! Configuration for watching a tool directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Default debounce window between accepted reload triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration for a watched directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Path to the directory. Only its direct children are watched.
    pub path: PathBuf,

    /// Extension of source files; events for other files are ignored.
    pub extension: String,

    /// Minimum time between accepted events.
    pub debounce: Duration,

    /// Capacity of the event channel between the OS watcher and consumers.
    pub channel_capacity: usize,
}

impl WatchConfig {
    /// Create a config for `.rhai` sources with the default debounce.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extension: "rhai".to_string(),
            debounce: DEFAULT_DEBOUNCE,
            channel_capacity: 1000,
        }
    }

    /// Set the source file extension (without the dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the event channel capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Check the config before starting a watcher.
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(WatcherError::Config(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(WatcherError::Config(format!(
                "invalid source extension: `{}`",
                self.extension
            )));
        }
        Ok(())
    }

    /// Whether `path` is a source file for this directory.
    ///
    /// Hidden files and editor backups are excluded.
    pub fn is_source_path(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        if file_name.starts_with('.') || file_name.ends_with('~') {
            return false;
        }
        path.extension().is_some_and(|ext| ext == self.extension.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_watch_config_creation() {
        let config = WatchConfig::new("/srv/tools")
            .with_extension("tool")
            .with_debounce(Duration::from_millis(50));

        assert_eq!(config.path, Path::new("/srv/tools"));
        assert_eq!(config.extension, "tool");
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_paths() {
        let config = WatchConfig::new("/srv/tools");

        assert!(config.is_source_path(Path::new("/srv/tools/quick_sort.rhai")));
        assert!(!config.is_source_path(Path::new("/srv/tools/notes.md")));
        assert!(!config.is_source_path(Path::new("/srv/tools/.quick_sort.rhai")));
        assert!(!config.is_source_path(Path::new("/srv/tools/quick_sort.rhai~")));
        assert!(!config.is_source_path(Path::new("/srv/tools")));
    }

    #[test]
    fn test_invalid_config() {
        let config = WatchConfig::new("/srv/tools").with_channel_capacity(0);
        assert!(matches!(config.validate(), Err(WatcherError::Config(_))));

        let config = WatchConfig::new("/srv/tools").with_extension(".rhai");
        assert!(config.validate().is_err());
    }
}
