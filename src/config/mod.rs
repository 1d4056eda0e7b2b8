//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read, decode, validate)
//!     → store.rs (versioned immutable snapshot, atomic swap)
//!     → shared via Arc to the controller, aggregator, and admin API
//!
//! Out-of-band edit:
//!     watcher.rs detects change
//!     → loader.rs loads new document
//!     → skip if digest unchanged
//!     → store.rs compare-and-swap (drop if an orchestrated save landed)
//!
//! Orchestrated edit:
//!     orchestration → loader.rs write_with_backup → store.rs replace
//! ```
//!
//! # Design Decisions
//! - The document is replaced whole, never field-patched
//! - All fields have defaults to allow minimal documents
//! - Validation separates syntactic (serde) from semantic checks
//! - settings.rs is the control plane's own settings, not the shared document

pub mod loader;
pub mod schema;
pub mod settings;
pub mod store;
pub mod validation;
pub mod watcher;

pub use loader::{ConfigPersistence, PersistenceError};
pub use schema::StackConfig;
pub use settings::ControlSettings;
pub use store::{ConfigSnapshot, ConfigStore};
pub use validation::ValidationError;
