//! In-memory configuration snapshot.
//!
//! # Design Decisions
//! - One `ArcSwapOption` cell holds an immutable snapshot; readers never
//!   block and never see a document under construction
//! - Every snapshot carries a monotonic version; 0 means "not loaded"
//! - `replace_if_version` lets a background reload lose cleanly to an
//!   orchestrated write that landed while it was reading the file

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::StackConfig;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Startup,
    Watcher,
    Orchestrated,
}

/// An immutable, fully-formed configuration document.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub version: u64,
    /// Digest of the serialized document this snapshot was read from or written as.
    pub digest: u64,
    pub origin: SnapshotOrigin,
    pub loaded_at: DateTime<Utc>,
    pub config: StackConfig,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("configuration not loaded")]
pub struct NotLoaded;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("snapshot moved from version {expected} to {found}")]
pub struct StaleSnapshot {
    pub expected: u64,
    pub found: u64,
}

/// Owner of the current configuration snapshot.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: ArcSwapOption<ConfigSnapshot>,
    next_version: AtomicU64,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Never blocks.
    pub fn get(&self) -> Result<Arc<ConfigSnapshot>, NotLoaded> {
        self.current.load_full().ok_or(NotLoaded)
    }

    /// Version of the current snapshot, or 0 when nothing is loaded.
    pub fn version(&self) -> u64 {
        self.current.load().as_ref().map_or(0, |s| s.version)
    }

    /// Swap in a new document unconditionally. Returns the new version.
    pub fn replace(&self, config: StackConfig, digest: u64, origin: SnapshotOrigin) -> u64 {
        let snapshot = self.snapshot(config, digest, origin);
        let version = snapshot.version;
        self.current.store(Some(Arc::new(snapshot)));
        tracing::debug!(version, ?origin, "Configuration snapshot replaced");
        version
    }

    /// Swap in a new document only if the current version is still `expected`.
    pub fn replace_if_version(
        &self,
        expected: u64,
        config: StackConfig,
        digest: u64,
        origin: SnapshotOrigin,
    ) -> Result<u64, StaleSnapshot> {
        let current = self.current.load();
        let found = current.as_ref().map_or(0, |s| s.version);
        if found != expected {
            return Err(StaleSnapshot { expected, found });
        }

        let snapshot = self.snapshot(config, digest, origin);
        let version = snapshot.version;
        let previous = self.current.compare_and_swap(&current, Some(Arc::new(snapshot)));
        let previous_version = previous.as_ref().map_or(0, |s| s.version);
        if previous_version != expected {
            return Err(StaleSnapshot {
                expected,
                found: previous_version,
            });
        }

        tracing::debug!(version, ?origin, "Configuration snapshot replaced");
        Ok(version)
    }

    fn snapshot(&self, config: StackConfig, digest: u64, origin: SnapshotOrigin) -> ConfigSnapshot {
        ConfigSnapshot {
            version: self.next_version.fetch_add(1, Ordering::SeqCst) + 1,
            digest,
            origin,
            loaded_at: Utc::now(),
            config,
        }
    }
}
