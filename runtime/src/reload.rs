//! Hot reloading of the watched tool directory.
//!
//! A [`ChangeWatcher`] runs two tasks:
//!
//! ```text
//! FileEvent ──► intake (EventGate) ──notify──► reload worker ──► ToolRegistry::replace
//! ```
//!
//! The intake task never waits for a reload. The first change in a quiet
//! period reloads at once; changes that land inside the debounce window are
//! coalesced into one more reload when the window ends, so a file that is
//! created and then written is always read in its final state. The worker
//! is woken through a [`Notify`], which stores at most one permit: triggers
//! that arrive while a reload is running collapse into a single follow-up
//! reload.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use toolsmith_directory_watcher::{
    DirectoryWatcher, EventGate, FileEvent, WatchConfig, WatcherError,
};
use toolsmith_registry::{DirectoryId, DirectoryLoader, ToolRegistry, UnitFailure};
use tracing::{debug, error, info, trace};

use crate::error::Result;

/// One item from a watcher's event stream.
pub type SourceEvent = std::result::Result<FileEvent, WatcherError>;

/// Outcome of one reload of a directory.
#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    /// Directory that was reloaded.
    pub directory: DirectoryId,

    /// Registry generation after the swap.
    pub generation: u64,

    /// Tools now contributed by the directory.
    pub registered: Vec<String>,

    /// Units that failed to load.
    pub failures: Vec<UnitFailure>,

    /// Time taken to build the snapshot.
    pub duration: Duration,
}

/// Rebuilds one directory's snapshot and swaps it into the registry.
#[derive(Debug, Clone)]
pub struct Reloader {
    registry: Arc<ToolRegistry>,
    loader: DirectoryLoader,
    directory: DirectoryId,
    path: PathBuf,
}

impl Reloader {
    /// Create a reloader for the directory at `path`.
    pub fn new(
        registry: Arc<ToolRegistry>,
        loader: DirectoryLoader,
        directory: DirectoryId,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            loader,
            directory,
            path: path.into(),
        }
    }

    /// The directory identifier.
    pub fn directory(&self) -> &DirectoryId {
        &self.directory
    }

    /// The directory path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the directory and replace its snapshot. Blocks while units run.
    pub fn reload(&self) -> ReloadOutcome {
        let report = self.loader.load(&self.directory, &self.path);
        let generation = self.registry.replace(&self.directory, report.snapshot);

        ReloadOutcome {
            directory: report.directory,
            generation,
            registered: report.registered,
            failures: report.failures,
            duration: report.duration,
        }
    }
}

/// Lifecycle of a [`ChangeWatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherStatus {
    /// Watching and reloading.
    Running,

    /// Stopped on request.
    Stopped,

    /// The event source died. Hot reload is disabled until restart; the
    /// registry keeps its last good contents.
    Failed(String),
}

#[derive(Debug)]
struct Shared {
    status: Mutex<WatcherStatus>,
    reloads: AtomicU64,
    wake: Notify,
}

impl Shared {
    fn status(&self) -> WatcherStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_running(&self) -> bool {
        self.status() == WatcherStatus::Running
    }

    /// Move from `Running` to `next`. Returns false if already out of
    /// `Running`, so the first terminal state sticks.
    fn leave_running(&self, next: WatcherStatus) -> bool {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status != WatcherStatus::Running {
            return false;
        }
        *status = next;
        true
    }
}

/// Keeps a directory's registry snapshot in sync with its files.
pub struct ChangeWatcher {
    shared: Arc<Shared>,
    directory: DirectoryId,
    intake: JoinHandle<()>,
    worker: JoinHandle<()>,
    source: Option<DirectoryWatcher>,
}

impl ChangeWatcher {
    /// Watch `config.path` with the OS notification backend and reload
    /// through `reloader` on every accepted change.
    pub fn start(config: WatchConfig, reloader: Reloader) -> Result<Self> {
        let mut source = DirectoryWatcher::new(config.clone());
        let events = source.start()?;
        let mut watcher = Self::spawn(config, events, reloader);
        watcher.source = Some(source);
        Ok(watcher)
    }

    /// Drive reloads from an arbitrary event stream.
    ///
    /// When `events` yields an error, or closes while the watcher is
    /// running, the watcher fails and hot reload stops. A closed stream
    /// fails with [`WatcherError::ChannelClosed`].
    pub fn spawn(
        config: WatchConfig,
        events: mpsc::Receiver<SourceEvent>,
        reloader: Reloader,
    ) -> Self {
        let shared = Arc::new(Shared {
            status: Mutex::new(WatcherStatus::Running),
            reloads: AtomicU64::new(0),
            wake: Notify::new(),
        });
        let directory = reloader.directory().clone();
        let label = config.path.display().to_string();
        info!("Hot reload enabled for {label} (debounce {:?})", config.debounce);

        let intake = tokio::spawn(intake(
            events,
            EventGate::new(config),
            Arc::clone(&shared),
            label,
        ));
        let worker = tokio::spawn(reload_worker(Arc::clone(&shared), Arc::new(reloader)));

        Self {
            shared,
            directory,
            intake,
            worker,
            source: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> WatcherStatus {
        self.shared.status()
    }

    /// Number of completed reloads.
    pub fn reload_count(&self) -> u64 {
        self.shared.reloads.load(Ordering::SeqCst)
    }

    /// The directory being kept in sync.
    pub fn directory(&self) -> &DirectoryId {
        &self.directory
    }

    /// Request a reload without a file event. Bypasses the debouncer but
    /// still coalesces with a pending reload.
    pub fn trigger(&self) {
        if self.shared.is_running() {
            self.shared.wake.notify_one();
        }
    }

    /// Stop watching and wait for both tasks to finish. A reload already
    /// in progress completes first.
    pub async fn stop(mut self) {
        self.shared.leave_running(WatcherStatus::Stopped);
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
        self.intake.abort();
        self.shared.wake.notify_one();

        match (&mut self.intake).await {
            Err(e) if !e.is_cancelled() => {
                error!("Event intake for {} panicked: {e}", self.directory);
            }
            _ => {}
        }
        if let Err(e) = (&mut self.worker).await {
            error!("Reload worker for {} panicked: {e}", self.directory);
        }
        info!("Hot reload stopped for {}", self.directory);
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("directory", &self.directory)
            .field("status", &self.status())
            .field("reloads", &self.reload_count())
            .finish()
    }
}

async fn intake(
    mut events: mpsc::Receiver<SourceEvent>,
    mut gate: EventGate,
    shared: Arc<Shared>,
    label: String,
) {
    let failure = loop {
        let due = gate.pending_deadline();
        tokio::select! {
            item = events.recv() => match item {
                Some(Ok(event)) => {
                    if gate.offer(&event, Instant::now()) {
                        let path = event.path.display();
                        info!("Detected {:?} of {path}, reloading tools", event.kind);
                        shared.wake.notify_one();
                    } else {
                        trace!("Coalescing {:?} of {}", event.kind, event.path.display());
                    }
                }
                Some(Err(e)) => break Some(e),
                None => break None,
            },
            () = sleep_until(due) => {
                if gate.fire_pending(Instant::now()) {
                    info!("Reloading {label} for changes made during the debounce window");
                    shared.wake.notify_one();
                }
            }
        }
    };

    drop(events);
    let failure = failure.unwrap_or_else(|| WatcherError::ChannelClosed(label));
    if shared.leave_running(WatcherStatus::Failed(failure.to_string())) {
        error!("Hot reload disabled: {failure}");
        shared.wake.notify_one();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

async fn reload_worker(shared: Arc<Shared>, reloader: Arc<Reloader>) {
    loop {
        shared.wake.notified().await;
        if !shared.is_running() {
            break;
        }

        let task = Arc::clone(&reloader);
        match tokio::task::spawn_blocking(move || task.reload()).await {
            Ok(outcome) => {
                let count = shared.reloads.fetch_add(1, Ordering::SeqCst) + 1;
                info!(
                    "Reload #{count} of {}: {} tools, {} failed units (generation {})",
                    outcome.directory,
                    outcome.registered.len(),
                    outcome.failures.len(),
                    outcome.generation
                );
            }
            Err(e) => error!("Reload of {} panicked: {e}", reloader.directory()),
        }
    }
    debug!("Reload worker for {} exiting", reloader.directory());
}
