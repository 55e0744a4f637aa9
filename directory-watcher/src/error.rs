//! Error types for the directory watcher.

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors raised while starting or running a watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The directory to watch does not exist.
    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    /// `start` was called on a running watcher.
    #[error("already watching {0}")]
    AlreadyWatching(String),

    /// The OS notification backend failed.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// The event channel closed while events were still expected. Hot
    /// reload stops for good.
    #[error("event channel closed for {0}")]
    ChannelClosed(String),

    /// Invalid watch settings.
    #[error("configuration error: {0}")]
    Config(String),
}
