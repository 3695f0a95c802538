//! # Retry
//!
//! Backoff gate for operations subject to transient failure (log I/O,
//! sink I/O).
//!
//! The owner of a retry loop asks [`RetryGate::allow`] whether more time
//! may be spent, then awaits [`RetryGate::pause`]. A pause returns early
//! with `IngestError::Cancelled` when the pipeline token fires.
//!
//! ```ignore
//! let mut gate = settings.gate(token.clone());
//! loop {
//!     match op() {
//!         Ok(v) => break Ok(v),
//!         Err(e) if e.is_transient() && gate.allow() => gate.pause().await?,
//!         Err(e) => break Err(e),
//!     }
//! }
//! ```

mod backoff;
mod gate;

pub use backoff::{Backoff, ExponentialBackoff, FixedDelay};
pub use gate::{RetryGate, RetrySettings};
