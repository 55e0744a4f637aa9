//! # Tool Registry
//!
//! This crate holds the live set of callable tools and builds it from
//! directories of script source units.
//!
//! - **Snapshots**: every directory contributes one immutable snapshot
//! - **Atomic Swap**: a reload replaces a directory's snapshot in one step
//! - **Isolated Units**: each source unit runs in its own engine and scope
//! - **Best-effort Loading**: one broken unit never blocks its siblings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Tool Registry                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DirectoryLoader ──► UnitLoader ──► SnapshotBuilder             │
//! │                                          │                      │
//! │                                          ▼                      │
//! │  ToolRegistry ◄── replace ─────── RegistrySnapshot              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod loader;
pub mod registry;
pub mod snapshot;
pub mod tool;
pub mod unit;

pub use error::{LoadError, RegistryError, Result};
pub use loader::{DirectoryLoader, LoadReport, UnitFailure};
pub use registry::{RegistryStats, RegistryView, ToolRegistry};
pub use snapshot::{DirectoryId, RegistrySnapshot, SnapshotBuilder};
pub use tool::{
    InvocationResult, MAX_TOOL_NAME_LEN, ToolDefinition, ToolEntry, is_valid_tool_name,
    schema_from_params,
};
pub use unit::{
    DEFAULT_UNIT_EXTENSION, Member, Namespace, Registration, RegistryUnitLoader,
    SandboxUnitLoader, ScriptFunction, SourceUnit, UnitLoader, next_module_id,
};
