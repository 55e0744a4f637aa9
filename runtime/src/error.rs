//! Error types for the tool runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while bootstrapping or driving the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] toolsmith_registry::RegistryError),

    /// Directory watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] toolsmith_directory_watcher::WatcherError),

    /// Tool generation error.
    #[error("generation error: {0}")]
    Generation(#[from] toolsmith_tool_gen::GenerationError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configuration file is not valid TOML for [`crate::RuntimeConfig`].
    #[error("invalid config file: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// Logging could not be installed.
    #[error("logging error: {0}")]
    Logging(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
