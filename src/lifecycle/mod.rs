//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Connect broker → Connect database → Subscribe sites
//!     → Start watcher → Serve changes
//!
//! Signals (signals.rs):
//!     SIGHUP → Trigger config reload
//!     Ctrl+C → Stop serving
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then broker, then database
//! - Each fatal startup failure has its own exit status

pub mod signals;
pub mod startup;
