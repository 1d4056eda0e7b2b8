//! Trading stack control plane library.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod orchestration;
pub mod resilience;
pub mod workers;

pub use config::schema::StackConfig;
pub use lifecycle::{ControlPlane, Shutdown};
pub use orchestration::{ApplyReport, OrchestrationController};
