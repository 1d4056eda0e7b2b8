//! Orchestrated save subsystem.
//!
//! # Data Flow
//! ```text
//! save_and_apply(config):
//!     validate → try-lock (else Busy)
//!     → Pausing: list, pause running workers (concurrent, per-worker deadline)
//!     → Persisting: write_with_backup
//!         ├─ failure → Recovering: unpause what was paused → Err(Persistence)
//!         └─ success → ConfigStore::replace
//!     → Unpausing: unpause every non-stopped worker
//!     → Signaling: reload signal to every running worker
//!     → ApplyReport (outcome + per-worker errors)
//! ```
//!
//! # Design Decisions
//! - The only orchestrated writer of the config store
//! - Only persistence failure and start-of-operation runtime unavailability
//!   abort; every other failure lands in the report

pub mod controller;
pub mod report;

pub use controller::{OrchestrationController, OrchestrationError};
pub use report::{ApplyOutcome, ApplyReport, OrchestrationState, Step, StepError};
