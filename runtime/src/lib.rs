//! # Tool Runtime
//!
//! This crate ties the workspace together into a runnable tool host:
//!
//! - **Layered Registry**: built-in tools, a static directory and a hot directory
//! - **Hot Reload**: debounced reloads of the hot directory on file changes
//! - **Self-extension**: the built-in `create_tool` synthesizes new tools
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Tool Runtime                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  RuntimeConfig ──► ToolRuntime ──► ToolRegistry                 │
//! │                        │               ▲                        │
//! │                        │               │ replace                │
//! │                        ├──► ChangeWatcher ◄── DirectoryWatcher  │
//! │                        │                                        │
//! │                        └──► create_tool ──► SynthesisPipeline   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use toolsmith_runtime::{RuntimeConfig, ToolRuntime};
//!
//! let runtime = ToolRuntime::new(RuntimeConfig::load(None)?)?;
//! runtime.load_all();
//! let watcher = runtime.watch()?;
//!
//! let sorted = runtime.invoke("quick_sort", serde_json::json!([[3, 1, 2]])).await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod reload;
pub mod runtime;

pub use config::{GeneratorConfig, RuntimeConfig};
pub use error::{Result, RuntimeError};
pub use reload::{ChangeWatcher, ReloadOutcome, Reloader, SourceEvent, WatcherStatus};
pub use runtime::{
    BUILTIN_DIRECTORY, CREATE_TOOL, CREATE_TOOL_ARG, HOT_DIRECTORY, STATIC_DIRECTORY,
    ToolRuntime,
};

// Re-export from dependencies for convenience
pub use toolsmith_registry::{ToolDefinition, ToolRegistry};
pub use toolsmith_tool_gen::{SessionStatus, SynthesisSession};
