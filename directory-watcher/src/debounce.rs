//! Coalescing bursts of file events.

use std::time::{Duration, Instant};

use crate::config::WatchConfig;
use crate::event::{FileEvent, FileEventKind};

/// Accepts at most one event per debounce window, and owes one trailing
/// trigger for whatever it dropped.
///
/// The first event is always accepted. After that, an event is accepted
/// only if at least `window` has passed since the last accepted one.
/// Events in between are coalesced: they mark the debouncer pending, and
/// once the window ends [`Debouncer::fire_pending`] accepts them as a
/// single trigger.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
    pending: bool,
}

impl Debouncer {
    /// Create a debouncer with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
            pending: false,
        }
    }

    /// The debounce window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// When the last event was accepted, if ever.
    pub fn last_accepted(&self) -> Option<Instant> {
        self.last_accepted
    }

    /// Offer an event observed at `now`. Returns whether it triggers.
    pub fn accept(&mut self, now: Instant) -> bool {
        let within_window = self
            .last_accepted
            .is_some_and(|last| now.saturating_duration_since(last) < self.window);
        if within_window {
            self.pending = true;
            return false;
        }

        self.last_accepted = Some(now);
        self.pending = false;
        true
    }

    /// When the coalesced events are due, if any were dropped.
    pub fn pending_deadline(&self) -> Option<Instant> {
        if !self.pending {
            return None;
        }
        self.last_accepted.map(|last| last + self.window)
    }

    /// Accept the coalesced events as one trigger if their window has
    /// ended. The trigger starts a new window.
    pub fn fire_pending(&mut self, now: Instant) -> bool {
        match self.pending_deadline() {
            Some(deadline) if now >= deadline => {
                self.last_accepted = Some(now);
                self.pending = false;
                true
            }
            _ => false,
        }
    }
}

/// Filter and debouncer for one watched directory.
#[derive(Debug, Clone)]
pub struct EventGate {
    config: WatchConfig,
    debouncer: Debouncer,
}

impl EventGate {
    /// Create a gate for `config`.
    pub fn new(config: WatchConfig) -> Self {
        let debouncer = Debouncer::new(config.debounce);
        Self { config, debouncer }
    }

    /// Whether the event concerns a source file at all. A rescan request
    /// always does.
    pub fn is_relevant(&self, event: &FileEvent) -> bool {
        if event.kind == FileEventKind::Rescan {
            return true;
        }
        !event.is_directory()
            && event.is_content_change()
            && self.config.is_source_path(&event.path)
    }

    /// Offer an event observed at `now`. Returns whether it should trigger
    /// a reload.
    pub fn offer(&mut self, event: &FileEvent, now: Instant) -> bool {
        self.is_relevant(event) && self.debouncer.accept(now)
    }

    /// When events coalesced by the debouncer are due.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.debouncer.pending_deadline()
    }

    /// Fire the trailing trigger for coalesced events if it is due.
    pub fn fire_pending(&mut self, now: Instant) -> bool {
        self.debouncer.fire_pending(now)
    }

    /// The underlying debouncer.
    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }
}
