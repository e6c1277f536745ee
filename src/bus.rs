//! Change notification bus.
//!
//! # Data Flow
//! ```text
//! ConfigWatcher (after a swap)
//!     → ChangeBus::publish(previous, current)
//!     → per-section equality check (broker, database, sites)
//!     → Mailbox::post for every changed section
//!
//! Flock (single consumer)
//!     → ChangeBus::recv().await
//!     → (Section, Change { previous, current })
//! ```
//!
//! # Design Decisions
//! - One mailbox per section, holding at most one pending change
//! - Posting into a full mailbox merges: the pending change keeps its
//!   `previous` and takes the newer `current`, so the diff the consumer
//!   computes spans every change it never saw
//! - Publishing never blocks the watcher

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::config::PigeonConfig;

/// Configuration section a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Broker,
    Database,
    Sites,
}

/// A before/after pair of configuration snapshots.
#[derive(Debug, Clone)]
pub struct Change {
    pub previous: Arc<PigeonConfig>,
    pub current: Arc<PigeonConfig>,
}

/// Size-one coalescing mailbox.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<Change>>,
    notify: Notify,
}

impl Mailbox {
    /// Post a change, merging with any pending one. Returns true if merged.
    pub fn post(&self, change: Change) -> bool {
        let merged = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_mut() {
                Some(pending) => {
                    pending.current = change.current;
                    true
                }
                None => {
                    *slot = Some(change);
                    false
                }
            }
        };
        self.notify.notify_one();
        merged
    }

    /// Take the pending change without waiting.
    pub fn try_take(&self) -> Option<Change> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait for the next change.
    pub async fn recv(&self) -> Change {
        loop {
            if let Some(change) = self.try_take() {
                return change;
            }
            self.notify.notified().await;
        }
    }
}

/// Per-section mailboxes shared by the watcher and the reconciler.
#[derive(Debug, Default)]
pub struct ChangeBus {
    broker: Mailbox,
    database: Mailbox,
    sites: Mailbox,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mailbox(&self, section: Section) -> &Mailbox {
        match section {
            Section::Broker => &self.broker,
            Section::Database => &self.database,
            Section::Sites => &self.sites,
        }
    }

    /// Signal every section that differs between `previous` and `current`.
    ///
    /// Returns the sections that were signalled.
    pub fn publish(&self, previous: &Arc<PigeonConfig>, current: &Arc<PigeonConfig>) -> Vec<Section> {
        let mut changed = Vec::new();
        if previous.broker != current.broker {
            changed.push(Section::Broker);
        }
        if previous.database != current.database {
            changed.push(Section::Database);
        }
        if previous.map() != current.map() {
            changed.push(Section::Sites);
        }

        for section in &changed {
            let merged = self.mailbox(*section).post(Change {
                previous: previous.clone(),
                current: current.clone(),
            });
            tracing::info!(section = ?section, merged, "Configuration section changed");
        }
        changed
    }

    /// Wait for the next change, preferring broker, then database, then sites.
    pub async fn recv(&self) -> (Section, Change) {
        tokio::select! {
            biased;
            change = self.broker.recv() => (Section::Broker, change),
            change = self.database.recv() => (Section::Database, change),
            change = self.sites.recv() => (Section::Sites, change),
        }
    }
}
