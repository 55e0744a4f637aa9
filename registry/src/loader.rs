//! Loading every source unit in a directory into one snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rhai::Engine;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::LoadError;
use crate::snapshot::{DirectoryId, RegistrySnapshot};
use crate::unit::{
    DEFAULT_UNIT_EXTENSION, RegistryUnitLoader, SourceUnit, UnitLoader, script_engine,
};

/// A unit that failed to load, and why.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    /// Path of the unit.
    pub path: PathBuf,

    /// What went wrong.
    pub error: LoadError,
}

/// Result of loading one directory.
#[derive(Debug)]
pub struct LoadReport {
    /// Directory the snapshot belongs to.
    pub directory: DirectoryId,

    /// Names contributed by the units that loaded, sorted.
    pub registered: Vec<String>,

    /// Units that failed to load.
    pub failures: Vec<UnitFailure>,

    /// The snapshot to swap into the registry.
    pub snapshot: RegistrySnapshot,

    /// Time taken by the load.
    pub duration: Duration,
}

impl LoadReport {
    /// Whether every unit loaded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scans a directory for source units and loads each of them.
///
/// Loading is best-effort: a unit that fails is reported in the
/// [`LoadReport`] and its siblings still load.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    extension: String,
    invoker: Arc<Engine>,
}

impl Default for DirectoryLoader {
    fn default() -> Self {
        Self {
            extension: DEFAULT_UNIT_EXTENSION.to_string(),
            invoker: Arc::new(script_engine()),
        }
    }
}

impl DirectoryLoader {
    /// Create a loader for `.rhai` units.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unit file extension (without the dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The unit file extension.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether `path` names a unit this loader would pick up.
    ///
    /// Only the file name is checked; `path` need not exist.
    pub fn is_unit_path(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        if file_name.starts_with('_') || file_name.starts_with('.') {
            return false;
        }
        path.extension().is_some_and(|ext| ext == self.extension.as_str())
    }

    /// List the units directly under `directory`, sorted by file name.
    pub fn discover(&self, directory: &Path) -> Vec<PathBuf> {
        WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .map(walkdir::DirEntry::into_path)
            .filter(|path| path.is_file() && self.is_unit_path(path))
            .collect()
    }

    /// Build a fresh snapshot for `directory_id` from the units in
    /// `directory`. Never fails; a missing directory yields an empty
    /// snapshot.
    pub fn load(&self, directory_id: &DirectoryId, directory: &Path) -> LoadReport {
        let started = Instant::now();
        let loader =
            RegistryUnitLoader::with_invoker(directory_id.clone(), Arc::clone(&self.invoker));
        let mut failures = Vec::new();

        if !directory.is_dir() {
            warn!("Tool directory {} does not exist; {directory_id} is empty", directory.display());
        }

        for path in self.discover(directory) {
            let loaded = SourceUnit::read(&path, directory_id.as_str())
                .and_then(|unit| loader.load_unit(&unit));
            match loaded {
                Ok(namespace) => debug!(
                    "Loaded {} as {} ({} tools)",
                    path.display(),
                    namespace.module_id(),
                    namespace.registrations().len()
                ),
                Err(error) => {
                    warn!("Skipping {}: {error}", path.display());
                    failures.push(UnitFailure { path, error });
                }
            }
        }

        let snapshot = loader.into_snapshot();
        let registered: Vec<String> = snapshot.names().map(String::from).collect();
        let duration = started.elapsed();
        info!(
            "Loaded {} tools from {} ({} units failed) in {duration:?}",
            registered.len(),
            directory.display(),
            failures.len()
        );

        LoadReport {
            directory: directory_id.clone(),
            registered,
            failures,
            snapshot,
            duration,
        }
    }
}
