//! Run-once gates.
//!
//! A [`Gate`] is a token that can be acquired without blocking. `run_once`
//! never releases it, so `f` runs at most once for the lifetime of the gate.
//! `run_once_per_period` releases it `period` after `f` started, so `f` runs
//! at most once per rolling window. Callers that find the gate held get
//! [`Blocked`] and `f` is not called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// `f` was not called because the gate was held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("f not called: gate is held")]
pub struct Blocked;

/// Non-blocking acquire/release token.
#[derive(Debug, Default)]
pub struct Gate {
    held: AtomicBool,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate if it is free.
    pub fn try_acquire(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Run `f` if `gate` is free, and keep the gate held forever.
pub fn run_once<T>(f: impl FnOnce() -> T, gate: &Gate) -> Result<T, Blocked> {
    if gate.try_acquire() {
        Ok(f())
    } else {
        Err(Blocked)
    }
}

/// Run `f` if `gate` is free, then release the gate `period` after `f` started.
///
/// The release is timer driven: on a Tokio runtime it is a spawned sleep,
/// otherwise a short-lived thread.
pub fn run_once_per_period<T>(
    f: impl FnOnce() -> T,
    gate: &Arc<Gate>,
    period: Duration,
) -> Result<T, Blocked> {
    if !gate.try_acquire() {
        return Err(Blocked);
    }
    let started = Instant::now();
    let output = f();
    release_after(gate.clone(), period.saturating_sub(started.elapsed()));
    Ok(output)
}

fn release_after(gate: Arc<Gate>, delay: Duration) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                gate.release();
            });
        }
        Err(_) => {
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                gate.release();
            });
        }
    }
}
