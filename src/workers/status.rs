//! Stack status aggregation.
//!
//! Reduces per-worker states plus broker reachability into one display
//! status. Advisory only: orchestration never consults it.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::settings::StatusSettings;
use crate::config::store::ConfigStore;
use crate::observability::metrics;
use crate::workers::{Worker, WorkerError, WorkerRegistry, WorkerState};

/// Overall stack status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    Running,
    Partial,
    NoWorkers,
    RuntimeUnavailable,
}

impl StackStatus {
    /// Reduce a registry listing into one status.
    pub fn reduce(listing: &Result<Vec<Worker>, WorkerError>) -> Self {
        match listing {
            Err(_) => StackStatus::RuntimeUnavailable,
            Ok(workers) if workers.is_empty() => StackStatus::NoWorkers,
            Ok(workers) if workers.iter().all(|w| w.state == WorkerState::Running) => StackStatus::Running,
            Ok(_) => StackStatus::Partial,
        }
    }

    fn gauge_level(self) -> u8 {
        match self {
            StackStatus::RuntimeUnavailable => 0,
            StackStatus::NoWorkers => 1,
            StackStatus::Partial => 2,
            StackStatus::Running => 3,
        }
    }
}

/// Broker connection reachability.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    pub address: Option<String>,
    pub reachable: bool,
    pub error: Option<String>,
}

/// Derived, never persisted, summary of the stack.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: StackStatus,
    pub workers: Vec<Worker>,
    pub runtime_error: Option<String>,
    pub upstream: UpstreamStatus,
    pub checked_at: DateTime<Utc>,
}

/// Polls the registry and broker, caching the latest snapshot.
pub struct StatusAggregator {
    registry: Arc<dyn WorkerRegistry>,
    store: Arc<ConfigStore>,
    settings: StatusSettings,
    latest: ArcSwapOption<StatusSnapshot>,
}

impl StatusAggregator {
    pub fn new(registry: Arc<dyn WorkerRegistry>, store: Arc<ConfigStore>, settings: StatusSettings) -> Self {
        Self {
            registry,
            store,
            settings,
            latest: ArcSwapOption::empty(),
        }
    }

    /// Last computed snapshot, if any poll has completed.
    pub fn latest(&self) -> Option<Arc<StatusSnapshot>> {
        self.latest.load_full()
    }

    /// Compute a fresh snapshot and cache it.
    pub async fn poll(&self) -> Arc<StatusSnapshot> {
        let listing = self.list_workers().await;
        let status = StackStatus::reduce(&listing);
        let (workers, runtime_error) = match listing {
            Ok(workers) => (workers, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        let snapshot = Arc::new(StatusSnapshot {
            status,
            workers,
            runtime_error,
            upstream: self.probe_upstream().await,
            checked_at: Utc::now(),
        });

        let previous = self.latest.swap(Some(snapshot.clone()));
        if previous.map(|p| p.status) != Some(status) {
            tracing::info!(status = ?status, "Stack status changed");
        }
        metrics::record_stack_status(status.gauge_level());
        snapshot
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, WorkerError> {
        let timeout = Duration::from_millis(self.settings.list_timeout_ms);
        match time::timeout(timeout, self.registry.list()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Worker listing timed out");
                Err(WorkerError::Unavailable(format!(
                    "listing workers timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn probe_upstream(&self) -> UpstreamStatus {
        let address = match self.store.get() {
            Ok(snapshot) => snapshot.config.broker.address(),
            Err(e) => {
                return UpstreamStatus {
                    address: None,
                    reachable: false,
                    error: Some(e.to_string()),
                }
            }
        };

        let timeout = Duration::from_millis(self.settings.upstream_timeout_ms);
        let error = match time::timeout(timeout, TcpStream::connect(address.as_str())).await {
            Ok(Ok(_stream)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("no response within {}ms", timeout.as_millis())),
        };
        if let Some(e) = &error {
            tracing::debug!(address = %address, error = %e, "Broker unreachable");
        }

        UpstreamStatus {
            address: Some(address),
            reachable: error.is_none(),
            error,
        }
    }

    /// Poll on an interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        tracing::info!(interval_secs = interval.as_secs(), "Status poller starting");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Status poller received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
