//! Worker control subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestration / status polling
//!     → WorkerRegistry (list, pause, unpause, signal)
//!     → docker.rs (container runtime binding)
//!
//! status.rs:
//!     list() + broker probe → StatusSnapshot (cached, advisory)
//! ```
//!
//! # Design Decisions
//! - Workers are discovered, never created, by this crate
//! - The registry contract is four methods; any supervisor can sit behind it
//! - No retry or backoff in bindings; that policy belongs to orchestration

pub mod docker;
pub mod status;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::retries::Retryable;

/// Runtime identifier of a worker (container ID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    Paused,
    Stopped,
    Unknown,
}

impl WorkerState {
    /// Map a container runtime state string.
    pub fn from_runtime(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "running" | "restarting" => WorkerState::Running,
            "paused" => WorkerState::Paused,
            "created" | "exited" | "dead" | "removing" => WorkerState::Stopped,
            _ => WorkerState::Unknown,
        }
    }
}

/// A managed process belonging to the trading stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    pub state: WorkerState,
    pub created_at: Option<DateTime<Utc>>,
}

/// Error from a single call into the worker runtime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker runtime unavailable: {0}")]
    Unavailable(String),

    #[error("worker {id} not found")]
    NotFound { id: WorkerId },

    #[error("worker {id}: {message}")]
    Control { id: WorkerId, message: String },

    #[error("worker {id} did not respond within {after_ms}ms")]
    Timeout { id: WorkerId, after_ms: u64 },
}

impl WorkerError {
    pub fn worker(&self) -> Option<&WorkerId> {
        match self {
            WorkerError::Unavailable(_) => None,
            WorkerError::NotFound { id }
            | WorkerError::Control { id, .. }
            | WorkerError::Timeout { id, .. } => Some(id),
        }
    }
}

impl Retryable for WorkerError {
    fn is_retryable(&self) -> bool {
        !matches!(self, WorkerError::NotFound { .. })
    }
}

/// Narrow contract over the external process/container runtime.
///
/// Implementations must treat pausing a paused worker and unpausing a
/// running one as success.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Workers belonging to this stack, in any lifecycle state.
    async fn list(&self) -> Result<Vec<Worker>, WorkerError>;

    async fn pause(&self, id: &WorkerId) -> Result<(), WorkerError>;

    async fn unpause(&self, id: &WorkerId) -> Result<(), WorkerError>;

    /// Deliver a named signal (e.g. "SIGUSR1").
    async fn signal(&self, id: &WorkerId, signal: &str) -> Result<(), WorkerError>;
}
