//! File events delivered by the watcher.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use serde::{Deserialize, Serialize};

/// One change to one path in the watched directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    /// What happened.
    pub kind: FileEventKind,

    /// The affected path.
    pub path: PathBuf,

    /// When the watcher saw the event.
    pub observed_at: DateTime<Utc>,

    /// Whether the path was a directory when the event was seen.
    pub is_directory: bool,
}

impl FileEvent {
    /// Create an event for a file path.
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            observed_at: Utc::now(),
            is_directory: false,
        }
    }

    /// Create an event, checking the file system for whether `path` is a
    /// directory. A path that no longer exists counts as a file.
    pub fn observed(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_directory = path.is_dir();
        Self {
            is_directory,
            ..Self::new(kind, path)
        }
    }

    /// The backend lost track of changes under `directory`; everything in
    /// it must be rescanned.
    pub fn rescan(directory: impl Into<PathBuf>) -> Self {
        Self::new(FileEventKind::Rescan, directory).for_directory()
    }

    /// Mark the event as concerning a directory.
    pub fn for_directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    /// Whether the event concerns a directory.
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Whether the event can change what the directory's units contain.
    pub fn is_content_change(&self) -> bool {
        self.kind.is_content_change()
    }

    /// The affected file name.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// The affected path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Kind of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Created,
    Modified,
    Removed,
    /// The path is the old side of a rename.
    RenamedAway,
    /// The path is the new side of a rename.
    RenamedInto,
    /// Permissions, timestamps and other metadata.
    Metadata,
    Accessed,
    /// Events were dropped by the backend, for example on queue overflow.
    Rescan,
    Other,
}

impl FileEventKind {
    /// Whether this kind of event can change a unit's source.
    pub fn is_content_change(self) -> bool {
        !matches!(self, Self::Accessed | Self::Metadata | Self::Other)
    }
}

impl From<notify::EventKind> for FileEventKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Self::RenamedAway,
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Self::RenamedInto,
            notify::EventKind::Modify(ModifyKind::Metadata(_)) => Self::Metadata,
            notify::EventKind::Modify(_) => Self::Modified,
            notify::EventKind::Remove(_) => Self::Removed,
            notify::EventKind::Access(_) => Self::Accessed,
            _ => Self::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, MetadataKind, RemoveKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_notify_kind_mapping() {
        let cases = [
            (notify::EventKind::Create(CreateKind::File), FileEventKind::Created),
            (notify::EventKind::Remove(RemoveKind::Any), FileEventKind::Removed),
            (
                notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                FileEventKind::RenamedAway,
            ),
            (
                notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                FileEventKind::RenamedInto,
            ),
            (
                notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                FileEventKind::Modified,
            ),
            (
                notify::EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                FileEventKind::Metadata,
            ),
            (notify::EventKind::Access(AccessKind::Any), FileEventKind::Accessed),
            (notify::EventKind::Any, FileEventKind::Other),
        ];
        for (kind, expected) in cases {
            let label = format!("{kind:?}");
            assert_eq!(FileEventKind::from(kind), expected, "{label}");
        }
    }

    #[test]
    fn test_rescan_is_a_content_change_of_the_directory() {
        let event = FileEvent::rescan("/t");
        assert_eq!(event.kind, FileEventKind::Rescan);
        assert!(event.is_directory());
        assert!(event.is_content_change());
    }

    #[test]
    fn test_content_changes() {
        assert!(FileEvent::new(FileEventKind::Created, "/t/a.rhai").is_content_change());
        assert!(FileEvent::new(FileEventKind::RenamedAway, "/t/a.rhai").is_content_change());
        assert!(!FileEvent::new(FileEventKind::Accessed, "/t/a.rhai").is_content_change());
        assert!(!FileEvent::new(FileEventKind::Metadata, "/t/a.rhai").is_content_change());
    }

    #[test]
    fn test_observed_checks_for_directories() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("adder.rhai");
        std::fs::write(&file, "fn adder(a, b) { a + b }").unwrap();

        let event = FileEvent::observed(FileEventKind::Modified, &file);
        assert!(!event.is_directory());
        assert_eq!(event.file_name(), Some("adder.rhai"));

        assert!(FileEvent::observed(FileEventKind::Created, dir.path()).is_directory());
        let gone = FileEvent::observed(FileEventKind::Removed, dir.path().join("gone.rhai"));
        assert!(!gone.is_directory());
    }
}
