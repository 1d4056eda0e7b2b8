//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Worker control call (pause / unpause / signal):
//!     → timeouts.rs (enforce per-worker deadline)
//!     → On retryable failure: retries.rs (retry with backoff.rs delay)
//! ```
//!
//! # Design Decisions
//! - Every call into the container runtime has a deadline
//! - Retry policy lives here and in the orchestration controller, never in
//!   the registry binding
//! - Jittered backoff keeps retries against a struggling daemon spread out

pub mod backoff;
pub mod retries;
pub mod timeouts;
