//! Single writer of the canonical playback state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::time::Instant;

use crate::model::{PlaybackState, Source};

/// Ordering token taken when an update's underlying async operation starts.
///
/// An update carrying a ticket older than the last applied one describes the
/// world before something newer was observed, and is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
struct Ledger {
    issued: u64,
    applied: u64,
    revision: u64,
}

/// Merges local device fragments and remote snapshots, last write wins.
///
/// Every accepted update replaces the state in full and is published to all
/// subscribers before `apply` returns.
pub struct Reconciler {
    ledger: Mutex<Ledger>,
    tx: watch::Sender<Arc<PlaybackState>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(PlaybackState::default()));
        Self {
            ledger: Mutex::new(Ledger::default()),
            tx,
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PlaybackState>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Arc<PlaybackState> {
        self.tx.borrow().clone()
    }

    pub fn ticket(&self) -> Ticket {
        let mut ledger = self.ledger();
        ledger.issued += 1;
        Ticket(ledger.issued)
    }

    /// Replace the canonical state with `state` unless `ticket` is stale.
    pub fn apply(&self, ticket: Ticket, source: Source, mut state: PlaybackState) -> bool {
        let mut ledger = self.ledger();
        if ticket.0 < ledger.applied {
            tracing::debug!(
                ?source,
                ticket = ticket.0,
                applied = ledger.applied,
                "Discarding stale playback update"
            );
            return false;
        }

        ledger.applied = ticket.0;
        ledger.revision += 1;
        state.source = Some(source);
        state.revision = ledger.revision;
        state.optimistic = false;

        tracing::trace!(
            ?source,
            revision = state.revision,
            is_playing = state.is_playing,
            progress_ms = state.progress_ms,
            track_id = ?state.track_id(),
            "Applied playback update"
        );
        self.tx.send_replace(Arc::new(state));
        true
    }

    /// Remote service reports nothing playing. Local state is kept only while
    /// the local device is still active; anything else is cleared.
    pub fn clear_remote(&self, ticket: Ticket, local_active: bool) -> bool {
        let current = self.current();
        if local_active && current.source == Some(Source::Local) {
            tracing::trace!("Ignoring empty remote snapshot while local device owns playback");
            return false;
        }
        if current.track.is_none() && !current.is_playing && !current.optimistic {
            return false;
        }
        self.apply(ticket, Source::Remote, PlaybackState::default())
    }

    /// Local device stopped rendering. Freezes the local state without
    /// claiming that playback stopped everywhere.
    pub fn local_playback_stopped(&self, ticket: Ticket) -> bool {
        let current = self.current();
        if current.source != Some(Source::Local) || !current.is_playing {
            return false;
        }
        let mut state = (*current).clone();
        state.rebase(Instant::now());
        state.is_playing = false;
        self.apply(ticket, Source::Local, state)
    }

    /// Apply a UI latency hide on top of the current state. Returns the
    /// revision of the echo so the caller can roll it back.
    ///
    /// Echoes take no ticket: the next real update always replaces them.
    pub fn apply_optimistic(&self, edit: impl FnOnce(&mut PlaybackState)) -> u64 {
        let mut ledger = self.ledger();
        let mut state = (*self.tx.borrow().clone()).clone();
        edit(&mut state);
        ledger.revision += 1;
        state.revision = ledger.revision;
        state.optimistic = true;
        let revision = state.revision;
        self.tx.send_replace(Arc::new(state));
        revision
    }

    /// Undo an echo, but only while it is still the published revision.
    pub fn rollback(&self, revision: u64, edit: impl FnOnce(&mut PlaybackState)) -> bool {
        let mut ledger = self.ledger();
        let current = self.tx.borrow().clone();
        if current.revision != revision || !current.optimistic {
            return false;
        }
        let mut state = (*current).clone();
        edit(&mut state);
        ledger.revision += 1;
        state.revision = ledger.revision;
        self.tx.send_replace(Arc::new(state));
        true
    }
}
