//! Immutable registry snapshots and the builder that produces them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::tool::{ToolDefinition, is_valid_tool_name};

/// Identifies the directory (or other origin) a snapshot was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirectoryId(String);

impl DirectoryId {
    /// Create a new directory identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DirectoryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Point-in-time mapping of tool name to definition for one directory.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    tools: BTreeMap<String, Arc<ToolDefinition>>,
    built_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// A snapshot with no tools.
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
            built_at: Utc::now(),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
        self.tools.get(name)
    }

    /// Tool names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Iterate over the definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDefinition>> {
        self.tools.values()
    }

    /// Number of tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the snapshot has no tools.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// When the snapshot was built.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Collects registrations for one load pass.
///
/// Names are unique within a builder: the first registration of a name wins
/// and later ones are rejected with [`RegistryError::NameCollision`].
#[derive(Debug)]
pub struct SnapshotBuilder {
    directory: DirectoryId,
    tools: BTreeMap<String, Arc<ToolDefinition>>,
}

impl SnapshotBuilder {
    /// Start an empty pending snapshot for `directory`.
    pub fn new(directory: DirectoryId) -> Self {
        Self {
            directory,
            tools: BTreeMap::new(),
        }
    }

    /// The directory this snapshot is being built for.
    pub fn directory(&self) -> &DirectoryId {
        &self.directory
    }

    /// Whether `name` is already claimed in this pass.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names claimed so far.
    pub fn names(&self) -> BTreeSet<String> {
        self.tools.keys().cloned().collect()
    }

    /// Register a single tool.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<()> {
        self.check(&definition.name)?;
        self.tools
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    /// Register a batch of tools, all or nothing.
    pub fn register_all(&mut self, definitions: Vec<ToolDefinition>) -> Result<()> {
        let mut seen = BTreeSet::new();
        for definition in &definitions {
            self.check(&definition.name)?;
            if !seen.insert(definition.name.as_str()) {
                return Err(self.collision(&definition.name));
            }
        }

        for definition in definitions {
            self.tools
                .insert(definition.name.clone(), Arc::new(definition));
        }
        Ok(())
    }

    /// Freeze the pending registrations into a snapshot.
    pub fn build(self) -> RegistrySnapshot {
        RegistrySnapshot {
            tools: self.tools,
            built_at: Utc::now(),
        }
    }

    fn check(&self, name: &str) -> Result<()> {
        if !is_valid_tool_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.contains(name) {
            return Err(self.collision(name));
        }
        Ok(())
    }

    fn collision(&self, name: &str) -> RegistryError {
        RegistryError::NameCollision {
            name: name.to_string(),
            directory: self.directory.to_string(),
        }
    }
}
