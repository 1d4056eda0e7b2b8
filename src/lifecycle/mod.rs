//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings → build store/persistence/registry/controller/aggregator
//!     → initial load → start watcher + status poller
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → background loops exit → join
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Every component is constructed once and passed by `Arc`; no globals
//! - A missing or invalid configuration file does not prevent startup
//! - An orchestrated save already in flight runs to completion on its own task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{ControlPlane, StartupError};
