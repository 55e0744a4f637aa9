//! # Directory Watcher
//!
//! This crate watches a tool source directory and turns bursts of file
//! system events into debounced reload triggers.
//!
//! ## Features
//!
//! - **Real-time Watching**: OS notifications for one directory's files
//! - **Source Filtering**: directory events and foreign files are ignored
//! - **Debouncing**: one leading trigger per window, plus one trailing
//!   trigger for events coalesced inside it
//! - **Failure Reporting**: backend errors and dropped-event rescans are
//!   forwarded to the consumer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchConfig ──► DirectoryWatcher ──► FileEvent                 │
//! │                                           │                     │
//! │                                           ▼                     │
//! │                          EventGate (filter + Debouncer)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod debounce;
pub mod error;
pub mod event;
pub mod watcher;

pub use config::{DEFAULT_DEBOUNCE, WatchConfig};
pub use debounce::{Debouncer, EventGate};
pub use error::{Result, WatcherError};
pub use event::{FileEvent, FileEventKind};
pub use watcher::DirectoryWatcher;
