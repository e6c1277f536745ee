//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

use crate::bus::ChangeBus;
use crate::config::store::{ConfigStore, Reload};
use crate::debounce::{run_once_per_period, Blocked, Gate};
use crate::observability::metrics::{self, ReloadOutcome};

/// What asked for a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Filesystem,
    Signal,
}

/// Debounced reload-and-publish cycle.
pub struct ReloadCycle {
    store: Arc<ConfigStore>,
    bus: Arc<ChangeBus>,
    gate: Arc<Gate>,
    period: Duration,
}

impl ReloadCycle {
    pub fn new(store: Arc<ConfigStore>, bus: Arc<ChangeBus>, period: Duration) -> Self {
        Self {
            store,
            bus,
            gate: Arc::new(Gate::new()),
            period,
        }
    }

    /// Reload once unless a reload already ran within the current window.
    pub fn fire(&self) -> ReloadOutcome {
        let outcome = match run_once_per_period(|| self.reload_and_publish(), &self.gate, self.period) {
            Ok(outcome) => outcome,
            Err(Blocked) => {
                tracing::debug!("Reload suppressed by cool-down");
                ReloadOutcome::Blocked
            }
        };
        metrics::record_reload(outcome);
        outcome
    }

    fn reload_and_publish(&self) -> ReloadOutcome {
        match self.store.reload() {
            Ok(Reload::Applied { previous, current }) => {
                let changed = self.bus.publish(&previous, &current);
                tracing::info!(sections = changed.len(), "Configuration reloaded");
                ReloadOutcome::Applied
            }
            Ok(Reload::Skipped) => ReloadOutcome::Skipped,
            Err(e) => {
                tracing::error!(
                    path = ?self.store.path(),
                    error = %e,
                    "Failed to reload config. Keeping current configuration."
                );
                ReloadOutcome::Rejected
            }
        }
    }

    /// Consume triggers until every sender is gone.
    ///
    /// A trigger that is blocked, or that finds the file unreadable, schedules
    /// one more reload at the end of the window so the last edit of a burst
    /// is always applied.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Trigger>) {
        let mut trailing: Option<Instant> = None;
        loop {
            let deadline = trailing;
            tokio::select! {
                trigger = rx.recv() => {
                    let Some(trigger) = trigger else { break };
                    tracing::debug!(trigger = ?trigger, "Reload requested");
                    match self.fire() {
                        ReloadOutcome::Blocked | ReloadOutcome::Skipped => {
                            trailing.get_or_insert_with(|| Instant::now() + self.period);
                        }
                        _ => trailing = None,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    trailing = match self.fire() {
                        ReloadOutcome::Blocked => Some(Instant::now() + self.period),
                        _ => None,
                    };
                }
            }
        }
        tracing::debug!("Reload cycle stopped");
    }
}

/// Watches the configuration file and drives a [`ReloadCycle`].
pub struct ConfigWatcher {
    store: Arc<ConfigStore>,
    bus: Arc<ChangeBus>,
    period: Duration,
    tx: mpsc::UnboundedSender<Trigger>,
    rx: mpsc::UnboundedReceiver<Trigger>,
}

impl ConfigWatcher {
    pub fn new(store: Arc<ConfigStore>, bus: Arc<ChangeBus>, period: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            bus,
            period,
            tx,
            rx,
        }
    }

    /// Sender for reload requests from outside the filesystem (signals).
    pub fn trigger(&self) -> mpsc::UnboundedSender<Trigger> {
        self.tx.clone()
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.store.path().to_path_buf();
        let dir = watch_dir(&path);
        let file_name = path.file_name().map(|name| name.to_os_string());

        let tx = self.tx;
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours {
                        tracing::debug!(kind = ?event.kind, "Config file change detected");
                        let _ = tx.send(Trigger::Filesystem);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let cycle = ReloadCycle::new(self.store, self.bus, self.period);
        tokio::spawn(cycle.run(self.rx));

        tracing::info!(path = ?path, period = ?self.period, "Config watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
