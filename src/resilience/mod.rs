//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Broker/database rebuild at runtime:
//!     → backoff.rs (retry with exponential backoff and jitter)
//!     → give up after max_attempts; the caller treats it as fatal
//! ```

pub mod backoff;
