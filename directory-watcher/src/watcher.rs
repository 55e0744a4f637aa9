//! Directory watcher implementation.

use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::error::{Result, WatcherError};
use crate::event::{FileEvent, FileEventKind};

/// Watches the direct children of one directory.
///
/// Events are forwarded unfiltered from the OS notification thread into a
/// bounded channel. When the watcher stops, the sending side is dropped and
/// the receiver observes the channel closing. A backend error is forwarded
/// as the last item before the channel closes.
pub struct DirectoryWatcher {
    /// Watched directory.
    config: WatchConfig,

    /// Internal notify watcher, present while running.
    watcher: Option<RecommendedWatcher>,
}

impl DirectoryWatcher {
    /// Create a stopped watcher.
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            watcher: None,
        }
    }

    /// The watcher's configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Start watching. Returns the receiving end of the event channel.
    pub fn start(&mut self) -> Result<mpsc::Receiver<Result<FileEvent>>> {
        let path = self.config.path.clone();
        if self.watcher.is_some() {
            return Err(WatcherError::AlreadyWatching(path.display().to_string()));
        }

        self.config.validate()?;
        if !path.exists() {
            return Err(WatcherError::DirectoryNotFound(path.display().to_string()));
        }
        if !path.is_dir() {
            return Err(WatcherError::Config(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        let (event_tx, event_rx) = mpsc::channel(self.config.channel_capacity);
        let mut forward = Forwarder {
            root: path.clone(),
            sender: Some(event_tx),
        };
        let mut watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| forward.handle(res),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);
        info!("Started watching {}", path.display());

        Ok(event_rx)
    }

    /// Stop watching. The event channel closes once the OS thread exits.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.config.path) {
                warn!("Failed to unwatch {}: {e}", self.config.path.display());
            }
            info!("Stopped watching {}", self.config.path.display());
        }
    }

    /// Check if the watcher is running.
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }
}

/// Runs on the notification thread and feeds the event channel.
struct Forwarder {
    root: PathBuf,
    sender: Option<mpsc::Sender<Result<FileEvent>>>,
}

impl Forwarder {
    fn handle(&mut self, res: notify::Result<notify::Event>) {
        match res {
            Ok(event) => {
                if event.need_rescan() {
                    warn!("Change events were dropped for {}; rescanning", self.root.display());
                    self.send(Ok(FileEvent::rescan(&self.root)));
                }
                let kind = FileEventKind::from(event.kind);
                for path in event.paths {
                    self.send(Ok(FileEvent::observed(kind, path)));
                }
            }
            Err(e) => {
                error!("Watch error for {}: {e}", self.root.display());
                self.send(Err(WatcherError::Notify(e)));
                // Nothing after a backend failure can be trusted.
                self.sender = None;
            }
        }
    }

    fn send(&mut self, item: Result<FileEvent>) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.blocking_send(item).is_err() {
            debug!("Event receiver dropped; discarding file events");
            self.sender = None;
        }
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}
