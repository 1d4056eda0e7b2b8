//! Configuration file watcher for hot reload.
//!
//! Best-effort pickup of out-of-band edits. This path never pauses workers;
//! orchestrated edits go through `OrchestrationController`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::loader::{ConfigPersistence, PersistenceError};
use crate::config::store::{ConfigStore, SnapshotOrigin};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("configuration path has no parent directory: {0}")]
    NoParent(PathBuf),

    #[error("failed to prepare watch directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
}

/// What a single reload attempt did.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// The file was decoded and swapped in as this version.
    Applied(u64),
    /// The file matches the current snapshot.
    Unchanged,
    /// Another writer replaced the snapshot while the file was being read.
    Superseded,
    /// The file could not be read or decoded; the snapshot is untouched.
    Rejected(PersistenceError),
}

/// Watches the configuration directory and reloads the document into the store.
#[derive(Clone)]
pub struct ChangeWatcher {
    persistence: Arc<ConfigPersistence>,
    store: Arc<ConfigStore>,
    debounce: Duration,
}

impl ChangeWatcher {
    pub fn new(persistence: Arc<ConfigPersistence>, store: Arc<ConfigStore>, debounce: Duration) -> Self {
        Self {
            persistence,
            store,
            debounce,
        }
    }

    /// Register the OS watch and spawn the reload loop.
    ///
    /// The directory is watched rather than the file so that atomic
    /// rename-over writes keep being observed.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> Result<JoinHandle<()>, WatchError> {
        let config_path = self.persistence.path().to_path_buf();
        let dir = match config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            Some(_) => PathBuf::from("."),
            None => return Err(WatchError::NoParent(config_path)),
        };
        std::fs::create_dir_all(&dir).map_err(|source| WatchError::Io {
            path: dir.clone(),
            source,
        })?;
        let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
        let target = match config_path.file_name() {
            Some(name) => dir.join(name),
            None => return Err(WatchError::NoParent(config_path)),
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %target.display(), debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");

        Ok(tokio::spawn(self.run(watcher, target, event_rx, shutdown)))
    }

    async fn run(
        self,
        _watcher: RecommendedWatcher,
        target: PathBuf,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Config watcher received shutdown signal, exiting loop");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::error!(error = %e, "Watch error");
                            continue;
                        }
                    };
                    if !is_relevant(&event, &target) {
                        continue;
                    }

                    tracing::info!("Config file change detected, reloading...");
                    tokio::time::sleep(self.debounce).await;
                    // Coalesce the burst that a single save produces.
                    while events.try_recv().is_ok() {}

                    self.reload().await;
                }
            }
        }
    }

    /// `reload_now` on the blocking pool; file reads stay off the runtime.
    pub async fn reload(&self) -> ReloadOutcome {
        let watcher = self.clone();
        match tokio::task::spawn_blocking(move || watcher.reload_now()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Reload task failed. Keeping current configuration.");
                ReloadOutcome::Rejected(PersistenceError::Io {
                    path: self.persistence.path().to_path_buf(),
                    source: std::io::Error::other(e.to_string()),
                })
            }
        }
    }

    /// Load the file and swap it in unless it is unchanged, invalid, or stale.
    pub fn reload_now(&self) -> ReloadOutcome {
        let seen_version = self.store.version();

        let loaded = match self.persistence.load() {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
                metrics::record_config_reload("rejected");
                return ReloadOutcome::Rejected(e);
            }
        };

        if let Ok(current) = self.store.get() {
            if current.digest == loaded.digest {
                tracing::debug!(version = current.version, "Config file unchanged, skipping reload");
                metrics::record_config_reload("unchanged");
                return ReloadOutcome::Unchanged;
            }
        }

        match self
            .store
            .replace_if_version(seen_version, loaded.config, loaded.digest, SnapshotOrigin::Watcher)
        {
            Ok(version) => {
                tracing::info!(version, "Configuration reloaded from disk");
                metrics::record_config_reload("applied");
                ReloadOutcome::Applied(version)
            }
            Err(stale) => {
                tracing::warn!(
                    expected = stale.expected,
                    found = stale.found,
                    "Snapshot changed during reload, discarding reloaded document"
                );
                metrics::record_config_reload("superseded");
                ReloadOutcome::Superseded
            }
        }
    }
}

fn is_relevant(event: &Event, target: &Path) -> bool {
    (event.kind.is_modify() || event.kind.is_create()) && event.paths.iter().any(|p| p == target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};

    #[test]
    fn test_relevance_requires_exact_path_and_write_kind() {
        let target = PathBuf::from("/etc/stack/config.toml");
        let hit = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(target.clone());
        let other_file = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/stack/.config.toml.tmp"));
        let removal = Event::new(EventKind::Remove(notify::event::RemoveKind::File)).add_path(target.clone());

        assert!(is_relevant(&hit, &target));
        assert!(!is_relevant(&other_file, &target));
        assert!(!is_relevant(&removal, &target));
    }
}
