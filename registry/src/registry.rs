//! Tool registry for runtime tool management.
//!
//! The registry is a stack of per-directory snapshots. Every mutation builds
//! a complete new [`RegistryView`] and swaps it in with a single `Arc`
//! replacement, so a reader holding a view sees either the old or the new
//! contents of a directory and never a mix of both.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::snapshot::{DirectoryId, RegistrySnapshot};
use crate::tool::ToolDefinition;

/// An immutable, merged view over all directory snapshots.
///
/// Layers are ordered by precedence: a later layer's tool shadows an
/// earlier layer's tool of the same name.
#[derive(Debug, Default)]
pub struct RegistryView {
    layers: Vec<(DirectoryId, Arc<RegistrySnapshot>)>,
    tools: BTreeMap<String, Arc<ToolDefinition>>,
    generation: u64,
}

impl RegistryView {
    fn with_layer(&self, directory: &DirectoryId, snapshot: RegistrySnapshot) -> Self {
        let snapshot = Arc::new(snapshot);
        let mut layers = self.layers.clone();
        match layers.iter_mut().find(|(id, _)| id == directory) {
            Some(layer) => layer.1 = snapshot,
            None => layers.push((directory.clone(), snapshot)),
        }

        let mut tools = BTreeMap::new();
        for (id, layer) in &layers {
            for definition in layer.iter() {
                if let Some(shadowed) = tools.insert(definition.name.clone(), definition.clone()) {
                    debug!(
                        "Tool `{}` from {id} shadows the one loaded from {}",
                        definition.name,
                        shadowed.source_path.display()
                    );
                }
            }
        }

        Self {
            layers,
            tools,
            generation: self.generation + 1,
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
        self.tools.get(name)
    }

    /// All visible tools, sorted by name.
    pub fn tools(&self) -> Vec<Arc<ToolDefinition>> {
        self.tools.values().cloned().collect()
    }

    /// The snapshot contributed by `directory`, if any.
    pub fn layer(&self, directory: &DirectoryId) -> Option<&Arc<RegistrySnapshot>> {
        self.layers
            .iter()
            .find(|(id, _)| id == directory)
            .map(|(_, snapshot)| snapshot)
    }

    /// Directory identifiers in precedence order (lowest first).
    pub fn directories(&self) -> impl Iterator<Item = &DirectoryId> {
        self.layers.iter().map(|(id, _)| id)
    }

    /// Number of swaps that produced this view.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of visible tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are visible.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Runtime registry for available tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    current: RwLock<Arc<RegistryView>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current view. The returned view never changes; call again to
    /// observe later swaps.
    pub fn current(&self) -> Arc<RegistryView> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replace the portion of the registry contributed by
    /// `directory` with `snapshot`.
    ///
    /// A directory seen for the first time is stacked above every existing
    /// directory. Returns the generation of the new view.
    pub fn replace(&self, directory: &DirectoryId, snapshot: RegistrySnapshot) -> u64 {
        let count = snapshot.len();
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(current.with_layer(directory, snapshot));
        let generation = next.generation();
        *current = next;
        drop(current);

        info!("Swapped in {count} tools for {directory} (generation {generation})");
        generation
    }

    /// Get a tool by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<ToolDefinition>> {
        self.current()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// List all tools. The result is a point-in-time copy.
    pub fn list(&self) -> Vec<Arc<ToolDefinition>> {
        self.current().tools()
    }

    /// Invoke a tool by name.
    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let definition = self.lookup(name)?;
        debug!("Invoking tool `{name}` from {}", definition.source_path.display());

        definition
            .entry
            .call(args)
            .await
            .map_err(|message| RegistryError::Invocation {
                name: name.to_string(),
                message,
            })
    }

    /// Get statistics about the registry.
    pub fn stats(&self) -> RegistryStats {
        let view = self.current();
        RegistryStats {
            total_tools: view.len(),
            by_directory: view
                .layers
                .iter()
                .map(|(id, snapshot)| (id.clone(), snapshot.len()))
                .collect(),
            generation: view.generation(),
        }
    }
}

/// Statistics about the tool registry.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Total number of visible tools.
    pub total_tools: usize,

    /// Tools contributed per directory, in precedence order.
    pub by_directory: Vec<(DirectoryId, usize)>,

    /// Generation of the current view.
    pub generation: u64,
}
